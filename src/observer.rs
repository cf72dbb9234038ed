//! Keeping highlights in sync with a live document.

use crate::{
	dom::{outermost_nodes, Dom, NodeKind},
	highlighter::Highlighter,
	keyword::KeywordSet,
	schedule::{PassScheduler, Tick},
};
use tracing::{debug, info, instrument, trace};

/// A change to the document, as reported by a `MutationObserver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<N> {
	ChildList { target: N, added: Vec<N>, removed: Vec<N> },
	CharacterData { target: N },
}

/// Drives a [`Highlighter`] from the outside world's events: mutation records, location changes, keyword snapshots
/// and the tab's enabled flag.
///
/// Mutations are collected, debounced and turned into incremental passes over just the affected nodes.
/// The host calls [`tick`](`ChangeObserver::tick`) once per animation frame (or idle callback); each tick runs at most
/// one batch of text nodes, which is the only point where highlighting work happens outside of explicit resets.
#[derive(Debug)]
pub struct ChangeObserver<D: Dom> {
	highlighter: Highlighter<D>,
	scheduler: PassScheduler<D>,
	keywords: KeywordSet,
	enabled: bool,
	location: Option<String>,
	pending: Vec<D::Node>,
	last_mutation_ms: Option<u64>,
}

impl<D: Dom> ChangeObserver<D> {
	/// Starts disabled and without keywords.
	#[must_use]
	pub fn new(dom: &D, highlighter: Highlighter<D>) -> Self {
		Self {
			scheduler: PassScheduler::new(dom, highlighter.config().batch_size),
			highlighter,
			keywords: KeywordSet::empty(),
			enabled: false,
			location: None,
			pending: Vec::new(),
			last_mutation_ms: None,
		}
	}

	#[must_use]
	pub fn highlighter(&self) -> &Highlighter<D> {
		&self.highlighter
	}

	pub fn highlighter_mut(&mut self) -> &mut Highlighter<D> {
		&mut self.highlighter
	}

	#[must_use]
	pub fn keywords(&self) -> &KeywordSet {
		&self.keywords
	}

	#[must_use]
	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Whether there is neither pending nor scheduled work.
	#[must_use]
	pub fn is_idle(&self) -> bool {
		self.pending.is_empty() && self.scheduler.is_idle()
	}

	fn is_active(&self) -> bool {
		self.enabled && !self.keywords.is_empty()
	}

	/// Replaces the keyword snapshot. If it differs and highlighting is enabled, the page is cleared and rebuilt.
	#[instrument(skip(self, dom, keywords), fields(keywords = keywords.len()))]
	pub fn set_keywords(&mut self, dom: &mut D, keywords: KeywordSet) {
		if keywords == self.keywords {
			trace!("Keyword snapshot unchanged.");
			return;
		}
		self.keywords = keywords;
		if self.enabled {
			self.rebuild(dom);
		}
	}

	/// Turns highlighting on or off for this page. Turning it off removes all markers.
	#[instrument(skip(self, dom))]
	pub fn set_enabled(&mut self, dom: &mut D, enabled: bool) {
		if enabled == self.enabled {
			return;
		}
		self.enabled = enabled;
		if enabled {
			self.schedule_body(dom);
		} else {
			self.reset();
			if let Some(body) = dom.body() {
				self.highlighter.clear_highlight(dom, &body);
			}
		}
	}

	/// Clears and rebuilds all highlights with the current snapshot.
	///
	/// This is also the recovery path after a category color change.
	pub fn reapply(&mut self, dom: &mut D) {
		if self.enabled {
			self.rebuild(dom);
		}
	}

	fn rebuild(&mut self, dom: &mut D) {
		self.reset();
		if let Some(body) = dom.body() {
			self.highlighter.clear_highlight(dom, &body);
		}
		self.schedule_body(dom);
	}

	fn reset(&mut self) {
		self.scheduler.cancel_all();
		self.pending.clear();
		self.last_mutation_ms = None;
	}

	fn schedule_body(&mut self, dom: &D) {
		if !self.is_active() {
			return;
		}
		match dom.body() {
			Some(body) => {
				self.scheduler.request(body);
			}
			None => debug!("No body to highlight yet."),
		}
	}

	/// Notes the page's current location. A change is treated as a new page: caches are dropped and the whole body is
	/// highlighted again.
	///
	/// Returns whether the location changed. The first call only records the location.
	pub fn location_changed(&mut self, dom: &mut D, location: &str) -> bool {
		if self.location.as_deref() == Some(location) {
			return false;
		}
		let first = self.location.is_none();
		self.location = Some(location.to_owned());
		if first {
			return false;
		}

		info!("Location changed. Rehighlighting from the body.");
		self.reset();
		self.highlighter.clear_cache();
		self.schedule_body(dom);
		true
	}

	/// Collects the nodes affected by `mutations` for the next debounced pass.
	///
	/// Markers, nodes inside markers, additions without visible text and text this engine already processed
	/// (like the pieces it inserts itself) are ignored.
	/// Removals need no handling, since node states expire with their nodes.
	pub fn record_mutations(&mut self, dom: &D, mutations: impl IntoIterator<Item = Mutation<D::Node>>, now_ms: u64) {
		if !self.enabled {
			return;
		}
		let before = self.pending.len();
		for mutation in mutations {
			match mutation {
				Mutation::ChildList { added, .. } => {
					for node in added {
						let relevant = match dom.kind(&node) {
							NodeKind::Element => !self.is_in_marker(dom, &node) && !dom.text_content(&node).trim().is_empty(),
							NodeKind::Text => {
								dom.parent(&node).map_or(false, |parent| !self.is_in_marker(dom, &parent))
									&& dom.text(&node).map_or(false, |text| !text.trim().is_empty())
									&& !self.highlighter.is_processed(dom, &node, &self.keywords)
							}
							NodeKind::Other => false,
						};
						if relevant {
							self.pending.push(node);
						}
					}
				}
				Mutation::CharacterData { target } => {
					if let Some(parent) = dom.parent(&target) {
						if dom.kind(&parent) == NodeKind::Element && !self.is_in_marker(dom, &parent) {
							self.pending.push(parent);
						}
					}
				}
			}
		}
		self.last_mutation_ms = Some(now_ms);
		if self.pending.len() > before {
			trace!("{} node(s) pending.", self.pending.len());
		}
	}

	fn is_in_marker(&self, dom: &D, node: &D::Node) -> bool {
		let class_name = &self.highlighter.config().class_name;
		let mut current = Some(node.clone());
		while let Some(node) = current {
			if dom.has_class(&node, class_name) {
				return true;
			}
			current = dom.parent(&node);
		}
		false
	}

	/// Does one unit of work: flushes pending nodes once the mutation debounce has elapsed, then runs one batch.
	///
	/// Flushed nodes are deduplicated and nodes below another pending node are dropped, since its pass covers them.
	pub fn tick(&mut self, dom: &mut D, now_ms: u64) -> Tick {
		let debounce = self.highlighter.config().mutation_debounce_ms;
		let settled = self.last_mutation_ms.map_or(true, |last| now_ms.saturating_sub(last) >= debounce);
		if settled && !self.pending.is_empty() {
			let mut pending = core::mem::take(&mut self.pending);
			if self.is_active() {
				pending.retain(|node| dom.is_connected(node));
				let recorded = pending.len();
				outermost_nodes(&*dom, &mut pending);
				trace!("Flushing {} pending node(s) as {} root(s).", recorded, pending.len());
				for node in pending {
					self.scheduler.request(node);
				}
			}
		}

		if !self.is_active() {
			return Tick::Idle;
		}
		let keywords = self.keywords.clone();
		match self.scheduler.run(dom, &mut self.highlighter, &keywords) {
			Tick::Idle if !self.pending.is_empty() => Tick::Busy { queued: 0 },
			tick => tick,
		}
	}
}
