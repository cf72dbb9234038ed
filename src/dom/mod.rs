//! The document seam.
//!
//! Everything the engine does to a page goes through [`Dom`], which is implemented for the browser in [`web`]
//! (on `wasm32` only) and for an in-memory tree in [`tree`].

use crate::error::DomError;
use core::fmt::Debug;
use std::borrow::Cow;

pub mod tree;
mod walker;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use walker::{Filter, TreeWalker};

/// The kinds of node the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	Element,
	Text,
	/// Comments, processing instructions, doctypes and the like. Never highlighted, never descended into.
	Other,
}

/// An opaque "already processed" value for one text node.
pub type Fingerprint = u64;

/// A side-table from nodes to [`Fingerprint`]s that never keeps a node alive.
///
/// Entries of nodes that leave the document disappear on their own (or at the latest on [`prune`](`NodeStates::prune`)),
/// so no explicit teardown is needed when the page removes content.
pub trait NodeStates<N> {
	fn get(&self, node: &N) -> Option<Fingerprint>;
	fn set(&mut self, node: &N, fingerprint: Fingerprint);
	fn remove(&mut self, node: &N);
	/// Drops all entries at once.
	fn clear(&mut self);
	/// Physically drops entries of dead nodes, where weakness is emulated. Returns how many were dropped.
	fn prune(&mut self) -> usize {
		0
	}
}

/// Drops repeated nodes from `nodes`, keeping first occurrences in order.
///
/// Node handles needn't be hashable, so a scratch [`NodeStates`] table serves as the visited set.
/// Dead nodes are never marked and may remain.
pub fn dedup_nodes<D: Dom + ?Sized>(dom: &D, nodes: &mut Vec<D::Node>) {
	let mut seen = dom.new_states();
	nodes.retain(|node| {
		if seen.get(node).is_some() {
			return false;
		}
		seen.set(node, 0);
		true
	});
}

/// Drops nodes that are repeated or lie below another node of `nodes`, keeping first occurrences in order.
///
/// Costs one ancestor walk per node.
pub fn outermost_nodes<D: Dom + ?Sized>(dom: &D, nodes: &mut Vec<D::Node>) {
	let mut marked = dom.new_states();
	for node in nodes.iter() {
		marked.set(node, 0);
	}
	let mut seen = dom.new_states();
	nodes.retain(|node| {
		if seen.get(node).is_some() {
			return false;
		}
		seen.set(node, 0);
		let mut ancestor = dom.parent(node);
		while let Some(current) = ancestor {
			if marked.get(&current).is_some() {
				return false;
			}
			ancestor = dom.parent(&current);
		}
		true
	});
}

/// Access to a document tree.
///
/// Read methods are infallible and answer conservatively for dead nodes (no parent, no children, no text).
/// Write methods fail with [`DomError`] instead of panicking, since the page may have changed the tree under the engine.
pub trait Dom {
	/// A cheap handle. Equality is node identity.
	type Node: Clone + PartialEq + Debug;
	type States: NodeStates<Self::Node>;

	fn new_states(&self) -> Self::States;

	/// The root highlighting starts from for whole-page passes, usually `<body>`.
	fn body(&self) -> Option<Self::Node>;

	fn kind(&self, node: &Self::Node) -> NodeKind;
	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
	fn first_child(&self, node: &Self::Node) -> Option<Self::Node>;
	fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

	fn children(&self, node: &Self::Node) -> Vec<Self::Node> {
		let mut children = Vec::new();
		let mut next = self.first_child(node);
		while let Some(child) = next {
			next = self.next_sibling(&child);
			children.push(child);
		}
		children
	}

	/// Upper-case tag name of an element, [`None`] for other nodes.
	fn tag_name(&self, node: &Self::Node) -> Option<Cow<'_, str>>;
	fn has_class(&self, node: &Self::Node, class: &str) -> bool;
	/// Whether the element itself is flagged as editable. Inheritance is handled by the caller walking ancestors.
	fn is_content_editable(&self, node: &Self::Node) -> bool;

	/// The data of a text node, [`None`] for other nodes.
	fn text(&self, node: &Self::Node) -> Option<String>;

	/// Concatenated text of all descendant text nodes.
	fn text_content(&self, node: &Self::Node) -> String {
		let mut content = String::new();
		for text_node in TreeWalker::new(self, node.clone(), |dom: &Self, node: &Self::Node| match dom.kind(node) {
			NodeKind::Text => Filter::Accept,
			NodeKind::Element => Filter::Skip,
			NodeKind::Other => Filter::Reject,
		}) {
			if let Some(text) = self.text(&text_node) {
				content.push_str(&text);
			}
		}
		content
	}

	/// Whether the node is (still) part of the live document.
	fn is_connected(&self, node: &Self::Node) -> bool;

	fn create_text(&mut self, data: &str) -> Result<Self::Node, DomError>;
	fn create_element(&mut self, tag: &str) -> Result<Self::Node, DomError>;
	fn set_class_name(&mut self, element: &Self::Node, class_name: &str) -> Result<(), DomError>;
	fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), DomError>;

	/// Puts `replacements` in place of `node`, in order. `node` leaves the document.
	fn replace_with(&mut self, node: &Self::Node, replacements: &[Self::Node]) -> Result<(), DomError>;

	/// Replaces `element` with its own child nodes, returning them.
	fn unwrap_element(&mut self, element: &Self::Node) -> Result<Vec<Self::Node>, DomError> {
		let children = self.children(element);
		self.replace_with(element, &children)?;
		Ok(children)
	}

	fn remove(&mut self, node: &Self::Node) -> Result<(), DomError>;

	/// Merges adjacent text nodes below `node` and drops empty ones.
	fn normalize(&mut self, node: &Self::Node) -> Result<(), DomError>;

	/// Every element below `root` (including `root`) carrying `class`, in document order.
	fn elements_with_class(&self, root: &Self::Node, class: &str) -> Vec<Self::Node> {
		TreeWalker::new(self, root.clone(), |dom: &Self, node: &Self::Node| match dom.kind(node) {
			NodeKind::Element if dom.has_class(node, class) => Filter::Accept,
			NodeKind::Element => Filter::Skip,
			_ => Filter::Reject,
		})
		.collect()
	}
}
