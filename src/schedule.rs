//! Serializing chunked passes, at most one at a time.

use crate::{
	dom::{Dom, NodeStates},
	highlighter::{Highlighter, Pass, Progress},
	keyword::KeywordSet,
};
use core::fmt::{self, Debug, Formatter};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// What happened to a pass request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
	Queued,
	/// The root is being processed right now. It will be processed once more after the current pass.
	Rerun,
	/// The root was already waiting.
	Duplicate,
}

/// State of a [`PassScheduler`] after one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
	/// Nothing to do until the next request.
	Idle,
	/// More batches are pending. Call again on the next frame.
	Busy { queued: usize },
}

/// A queue of roots to highlight, processed one batch of text nodes per call to [`run`](`PassScheduler::run`).
///
/// A batch is shared by all waiting roots: passes are finished and started in turn until `batch_size` text nodes were
/// processed, so many small roots settle as quickly as one large one.
/// Passes never interleave: a request for the root of the active pass is deferred until it completes.
pub struct PassScheduler<D: Dom> {
	active: Option<Pass<D::Node>>,
	rerun: bool,
	queue: VecDeque<D::Node>,
	/// Marks the roots in `queue`.
	waiting: D::States,
	batch_size: usize,
}

impl<D: Dom> Debug for PassScheduler<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("PassScheduler")
			.field("active", &self.active)
			.field("rerun", &self.rerun)
			.field("queue", &self.queue)
			.field("batch_size", &self.batch_size)
			.finish()
	}
}

impl<D: Dom> PassScheduler<D> {
	#[must_use]
	pub fn new(dom: &D, batch_size: usize) -> Self {
		Self {
			active: None,
			rerun: false,
			queue: VecDeque::new(),
			waiting: dom.new_states(),
			batch_size: batch_size.max(1),
		}
	}

	pub fn request(&mut self, root: D::Node) -> Request {
		if self.active.as_ref().map_or(false, |pass| *pass.root() == root) {
			self.rerun = true;
			return Request::Rerun;
		}
		if self.waiting.get(&root).is_some() {
			return Request::Duplicate;
		}
		self.waiting.set(&root, 0);
		self.queue.push_back(root);
		Request::Queued
	}

	#[must_use]
	pub fn is_idle(&self) -> bool {
		self.active.is_none() && self.queue.is_empty()
	}

	/// Number of roots waiting behind the active pass.
	#[must_use]
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	#[must_use]
	pub fn active_root(&self) -> Option<&D::Node> {
		self.active.as_ref().map(Pass::root)
	}

	/// Cancels the active pass and drops all waiting requests.
	pub fn cancel_all(&mut self) {
		if let Some(pass) = self.active.take() {
			pass.cancel();
			debug!("Cancelled active pass with {} text node(s) remaining.", pass.remaining());
		}
		self.rerun = false;
		self.queue.clear();
		self.waiting.clear();
	}

	/// Processes up to `batch_size` text nodes, finishing the active pass and starting waiting ones as needed.
	///
	/// Empty and cancelled passes cost nothing.
	pub fn run(&mut self, dom: &mut D, highlighter: &mut Highlighter<D>, keywords: &KeywordSet) -> Tick {
		if self.active.as_ref().map_or(false, |pass| pass.cancel_handle().is_cancelled()) {
			self.active = None;
			self.rerun = false;
		}

		let mut budget = self.batch_size;
		let mut passes = 0_usize;
		while budget > 0 {
			let mut pass = match self.active.take() {
				Some(pass) => pass,
				None => match self.next_pass(dom, highlighter, keywords) {
					Some(pass) => pass,
					None => break,
				},
			};
			passes += 1;

			let before = pass.remaining();
			let progress = highlighter.advance(dom, &mut pass, budget);
			budget = budget.saturating_sub(before - pass.remaining());
			match progress {
				Progress::Yielded { remaining } => {
					trace!("Yielding with {} text node(s) remaining.", remaining);
					self.active = Some(pass);
				}
				Progress::Finished(_) | Progress::Cancelled(_) => {
					if self.rerun {
						self.rerun = false;
						let root = pass.root().clone();
						if self.waiting.get(&root).is_none() {
							self.waiting.set(&root, 0);
							self.queue.push_front(root);
						}
					}
				}
			}
		}
		trace!("Batch touched {} pass(es).", passes);

		if self.is_idle() {
			Tick::Idle
		} else {
			Tick::Busy { queued: self.queue.len() }
		}
	}

	fn next_pass(&mut self, dom: &D, highlighter: &mut Highlighter<D>, keywords: &KeywordSet) -> Option<Pass<D::Node>> {
		while let Some(root) = self.queue.pop_front() {
			self.waiting.remove(&root);
			if dom.is_connected(&root) {
				return Some(highlighter.begin_pass(dom, &root, keywords));
			}
			trace!("Dropping request for a detached root.");
		}
		None
	}
}
