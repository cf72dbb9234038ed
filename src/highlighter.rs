use crate::{
	config::HighlightConfig,
	dom::{dedup_nodes, Dom, Fingerprint, NodeKind, NodeStates, TreeWalker},
	error::DomError,
	filter::NodeFilter,
	keyword::KeywordSet,
	matcher::{Match, MatchFinder, Prefilter},
	pattern::PatternCache,
};
use core::{
	cell::Cell,
	fmt::{self, Debug, Formatter},
	hash::{Hash, Hasher},
};
use std::{collections::hash_map::DefaultHasher, rc::Rc};
use tracing::{debug, info, instrument, trace, trace_span, warn};

/// Cooperative cancellation of a [`Pass`], checked at each batch boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Rc<Cell<bool>>);

impl CancelHandle {
	pub fn cancel(&self) {
		self.0.set(true)
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.0.get()
	}
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
	/// Eligible text nodes collected.
	pub text_nodes: usize,
	/// Text nodes skipped because they were processed against the same keywords before.
	pub unchanged: usize,
	/// Text nodes replaced by markers and plain text.
	pub rewritten: usize,
	pub markers: usize,
	/// Text nodes left as-is because of a DOM failure.
	pub failed: usize,
	/// Created markers removed again for having no visible text.
	pub swept: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
	/// The batch budget ran out. Call [`Highlighter::advance`] again, e.g. on the next animation frame.
	Yielded { remaining: usize },
	Finished(PassStats),
	/// The pass was cancelled at a batch boundary. Nodes highlighted so far stay highlighted.
	Cancelled(PassStats),
}

/// One chunked highlighting pass over a subtree.
///
/// The text nodes are collected up front against an immutable keyword snapshot.
/// Nodes that change or leave the document before their batch runs are skipped (and picked up by a later pass).
#[derive(Debug)]
pub struct Pass<N> {
	root: N,
	nodes: Vec<N>,
	cursor: usize,
	keywords: KeywordSet,
	prefilter: Prefilter,
	markers: Vec<N>,
	stats: PassStats,
	cancel: CancelHandle,
}

impl<N> Pass<N> {
	#[must_use]
	pub fn root(&self) -> &N {
		&self.root
	}

	#[must_use]
	pub fn keywords(&self) -> &KeywordSet {
		&self.keywords
	}

	#[must_use]
	pub fn remaining(&self) -> usize {
		self.nodes.len() - self.cursor
	}

	/// A handle that cancels this pass from elsewhere, e.g. on navigation.
	#[must_use]
	pub fn cancel_handle(&self) -> CancelHandle {
		self.cancel.clone()
	}

	pub fn cancel(&self) {
		self.cancel.cancel()
	}
}

enum Outcome {
	Unchanged,
	NoMatch,
	Rewritten { markers: usize },
}

/// The matching and annotation engine of one page (or frame).
///
/// Owns the pattern cache and the weak per-node states, so there is exactly one instance per document and it is
/// passed explicitly to whatever drives it, e.g. a [`ChangeObserver`](`crate::observer::ChangeObserver`).
///
/// None of the public methods fail. Per-node DOM failures are logged and the node is left unchanged.
pub struct Highlighter<D: Dom> {
	config: HighlightConfig,
	patterns: PatternCache,
	states: D::States,
	match_hook: Option<Box<dyn FnMut(&Match<'_>)>>,
}

impl<D: Dom> Debug for Highlighter<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Highlighter")
			.field("config", &self.config)
			.field("patterns", &self.patterns)
			.field("match_hook", &self.match_hook.is_some())
			.finish()
	}
}

impl<D: Dom> Highlighter<D> {
	#[must_use]
	pub fn new(dom: &D, config: HighlightConfig) -> Self {
		Self {
			patterns: PatternCache::new(config.pattern_cache_capacity),
			states: dom.new_states(),
			config,
			match_hook: None,
		}
	}

	#[must_use]
	pub fn config(&self) -> &HighlightConfig {
		&self.config
	}

	#[must_use]
	pub fn patterns(&self) -> &PatternCache {
		&self.patterns
	}

	#[must_use]
	pub fn states(&self) -> &D::States {
		&self.states
	}

	/// Installs a callback that is invoked synchronously for each accepted match that gets a marker.
	pub fn set_match_hook(&mut self, hook: impl FnMut(&Match<'_>) + 'static) {
		self.match_hook = Some(Box::new(hook));
	}

	/// Forgets all node states and compiled patterns. Always safe, since highlighting is idempotent.
	pub fn clear_cache(&mut self) {
		self.states.clear();
		self.patterns.clear();
		debug!("Cleared node states and pattern cache.");
	}

	/// Highlights every eligible occurrence of `keywords` below `root` in one go.
	pub fn highlight(&mut self, dom: &mut D, root: &D::Node, keywords: &KeywordSet) -> PassStats {
		let mut pass = self.begin_pass(dom, root, keywords);
		match self.advance(dom, &mut pass, usize::MAX) {
			Progress::Finished(stats) | Progress::Cancelled(stats) => stats,
			Progress::Yielded { .. } => {
				warn!("Unbounded pass yielded. This is a bug.");
				pass.stats
			}
		}
	}

	/// Collects the eligible text nodes below `root` for a chunked pass.
	///
	/// If `root` itself lies within a skipped region, or `keywords` is empty, the pass is empty.
	#[instrument(skip(self, dom, keywords), fields(keywords = keywords.len()))]
	pub fn begin_pass(&mut self, dom: &D, root: &D::Node, keywords: &KeywordSet) -> Pass<D::Node> {
		let filter = NodeFilter::new(&self.config);
		let nodes: Vec<D::Node> = if keywords.is_empty() || filter.should_skip(dom, root, None) {
			Vec::new()
		} else {
			TreeWalker::new(dom, root.clone(), |dom: &D, node: &D::Node| filter.text_filter(dom, node)).collect()
		};
		trace!("Collected {} text node(s).", nodes.len());

		Pass {
			root: root.clone(),
			stats: PassStats {
				text_nodes: nodes.len(),
				..PassStats::default()
			},
			nodes,
			cursor: 0,
			prefilter: Prefilter::new(keywords, self.config.match_flags()),
			keywords: keywords.clone(),
			markers: Vec::new(),
			cancel: CancelHandle::default(),
		}
	}

	/// Processes up to `budget` (at least one) further text nodes of `pass`.
	pub fn advance(&mut self, dom: &mut D, pass: &mut Pass<D::Node>, budget: usize) -> Progress {
		if pass.cancel.is_cancelled() {
			debug!("Pass cancelled with {} text node(s) remaining.", pass.remaining());
			return Progress::Cancelled(pass.stats);
		}

		let end = pass.cursor.saturating_add(budget.max(1)).min(pass.nodes.len());
		let keywords = pass.keywords.clone();
		while pass.cursor < end {
			let node = pass.nodes[pass.cursor].clone();
			pass.cursor += 1;

			let span = trace_span!("Processing text node", ?node);
			let _enter = span.enter();
			match self.process_text_node(dom, &node, &keywords, &pass.prefilter, &mut pass.markers) {
				Ok(Outcome::Unchanged) => pass.stats.unchanged += 1,
				Ok(Outcome::NoMatch) => (),
				Ok(Outcome::Rewritten { markers }) => {
					pass.stats.rewritten += 1;
					pass.stats.markers += markers;
				}
				Err(error) => {
					warn!("Leaving text node unhighlighted: {}", error);
					pass.stats.failed += 1;
				}
			}
		}

		if pass.cursor < pass.nodes.len() {
			return Progress::Yielded { remaining: pass.remaining() };
		}

		pass.stats.swept = self.sweep_empty_markers(dom, &mut pass.markers);
		info!(
			"Highlight pass finished: {} text node(s), {} unchanged, {} rewritten, {} marker(s), {} failed, {} swept. {} cached pattern(s).",
			pass.stats.text_nodes,
			pass.stats.unchanged,
			pass.stats.rewritten,
			pass.stats.markers,
			pass.stats.failed,
			pass.stats.swept,
			self.patterns.len(),
		);
		Progress::Finished(pass.stats)
	}

	fn process_text_node(
		&mut self,
		dom: &mut D,
		node: &D::Node,
		keywords: &KeywordSet,
		prefilter: &Prefilter,
		markers: &mut Vec<D::Node>,
	) -> Result<Outcome, DomError> {
		if !dom.is_connected(node) {
			return Err(DomError::Detached);
		}
		let text = dom.text(node).ok_or(DomError::Detached)?;
		if text.trim().is_empty() {
			return Ok(Outcome::NoMatch);
		}

		let fingerprint = self.fingerprint(&text, keywords);
		if self.states.get(node) == Some(fingerprint) {
			trace!("Unchanged since last pass.");
			return Ok(Outcome::Unchanged);
		}
		if !prefilter.might_match(&text) {
			self.states.set(node, fingerprint);
			return Ok(Outcome::NoMatch);
		}

		let matches = MatchFinder::new(&mut self.patterns, self.config.match_flags()).find_matches(&text, keywords);
		if matches.is_empty() {
			self.states.set(node, fingerprint);
			return Ok(Outcome::NoMatch);
		}

		#[cfg(feature = "dangerous-logging")]
		trace!(?text, "Rewriting with {} match(es).", matches.len());
		#[cfg(not(feature = "dangerous-logging"))]
		trace!("Rewriting {} byte(s) of text with {} match(es).", text.len(), matches.len());

		let mut created = Vec::with_capacity(matches.len() * 2 + 1);
		let mut plain = Vec::with_capacity(matches.len() + 1);
		let mut new_markers = Vec::with_capacity(matches.len());
		let built = self.build_replacement(dom, &text, &matches, &mut created, &mut plain, &mut new_markers);
		if let Err(error) = built.and_then(|()| dom.replace_with(node, &created)) {
			for orphan in &created {
				// Never inserted, so this only frees them where the DOM supports that.
				let _ = dom.remove(orphan);
			}
			return Err(error);
		}

		for (piece, piece_text) in &plain {
			let piece_fingerprint = self.fingerprint(piece_text, keywords);
			self.states.set(piece, piece_fingerprint);
		}
		if let Some(hook) = self.match_hook.as_mut() {
			for found in &matches {
				hook(found);
			}
		}
		let count = new_markers.len();
		markers.extend(new_markers);
		Ok(Outcome::Rewritten { markers: count })
	}

	/// Splits `text` at the match boundaries into detached plain text nodes and markers, in document order.
	fn build_replacement(
		&self,
		dom: &mut D,
		text: &str,
		matches: &[Match<'_>],
		created: &mut Vec<D::Node>,
		plain: &mut Vec<(D::Node, String)>,
		markers: &mut Vec<D::Node>,
	) -> Result<(), DomError> {
		let mut last = 0;
		for found in matches {
			if found.start > last {
				let piece = &text[last..found.start];
				let node = dom.create_text(piece)?;
				created.push(node.clone());
				plain.push((node, piece.to_owned()));
			}

			let marker = dom.create_element(&self.config.marker_tag)?;
			created.push(marker.clone());
			dom.set_class_name(&marker, &self.config.marker_class(found.keyword.color))?;
			let content = dom.create_text(&found.matched_text)?;
			dom.append_child(&marker, &content)?;
			markers.push(marker);

			last = found.end;
		}
		if last < text.len() {
			let piece = &text[last..];
			let node = dom.create_text(piece)?;
			created.push(node.clone());
			plain.push((node, piece.to_owned()));
		}
		Ok(())
	}

	/// Removes markers created by this pass that ended up without visible text.
	fn sweep_empty_markers(&mut self, dom: &mut D, markers: &mut Vec<D::Node>) -> usize {
		let mut swept = 0;
		for marker in markers.drain(..) {
			if !dom.is_connected(&marker) || !dom.text_content(&marker).trim().is_empty() {
				continue;
			}
			match dom.remove(&marker) {
				Ok(()) => swept += 1,
				Err(error) => warn!("Failed to remove empty marker: {}", error),
			}
		}
		swept
	}

	/// Unwraps every marker below `root` (inclusive), merges the freed text back into its neighbors and forgets all
	/// cached state.
	///
	/// Afterwards, the text content of `root` equals what it was before highlighting.
	/// Returns the number of markers removed.
	#[instrument(skip(self, dom))]
	pub fn clear_highlight(&mut self, dom: &mut D, root: &D::Node) -> usize {
		let markers = dom.elements_with_class(root, &self.config.class_name);
		let mut parents: Vec<D::Node> = Vec::new();
		let mut unwrapped = 0;
		for marker in markers {
			let parent = match dom.parent(&marker) {
				Some(parent) => parent,
				None => {
					warn!("Marker without parent. Skipping it.");
					continue;
				}
			};
			match dom.unwrap_element(&marker) {
				Ok(_) => {
					unwrapped += 1;
					parents.push(parent);
				}
				Err(error) => warn!("Failed to unwrap marker: {}", error),
			}
		}
		dedup_nodes(&*dom, &mut parents);
		for parent in parents {
			if let Err(error) = dom.normalize(&parent) {
				warn!("Failed to normalize after unwrapping markers: {}", error);
			}
		}

		self.clear_cache();
		info!("Cleared {} marker(s).", unwrapped);
		unwrapped
	}

	/// Whether `node` is a text node whose current text was already processed against `keywords`.
	///
	/// Plain text pieces this engine inserts are processed by construction, which lets observers ignore them.
	#[must_use]
	pub fn is_processed(&self, dom: &D, node: &D::Node, keywords: &KeywordSet) -> bool {
		if dom.kind(node) != NodeKind::Text {
			return false;
		}
		match (self.states.get(node), dom.text(node)) {
			(Some(state), Some(text)) => state == self.fingerprint(&text, keywords),
			_ => false,
		}
	}

	fn fingerprint(&self, text: &str, keywords: &KeywordSet) -> Fingerprint {
		let mut hasher = DefaultHasher::new();
		text.hash(&mut hasher);
		keywords.fingerprint().hash(&mut hasher);
		self.config.match_flags().hash(&mut hasher);
		self.config.class_name.hash(&mut hasher);
		self.config.style_prefix.hash(&mut hasher);
		hasher.finish()
	}
}
