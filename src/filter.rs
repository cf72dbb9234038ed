//! Eligibility of nodes for highlighting.

use crate::{
	config::HighlightConfig,
	dom::{Dom, Filter, NodeKind},
};

/// Decides which nodes must never be rewritten: non-rendered containers, input surfaces, editable regions and
/// existing markers.
#[derive(Debug, Clone, Copy)]
pub struct NodeFilter<'a> {
	config: &'a HighlightConfig,
}

impl<'a> NodeFilter<'a> {
	#[must_use]
	pub fn new(config: &'a HighlightConfig) -> Self {
		Self { config }
	}

	/// Whether this one element disqualifies its whole subtree.
	pub fn rejects_element<D: Dom + ?Sized>(&self, dom: &D, element: &D::Node) -> bool {
		dom.has_class(element, &self.config.class_name)
			|| dom.is_content_editable(element)
			|| dom.tag_name(element).map_or(false, |tag| self.config.is_skip_tag(&tag))
	}

	/// Whether `node` must be left alone, judging `node` and each of its ancestors up to, but excluding, `root`.
	///
	/// With `root` [`None`], the whole ancestor chain is checked.
	/// Nodes that are neither elements nor text are always skipped.
	pub fn should_skip<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node, root: Option<&D::Node>) -> bool {
		let mut current = match dom.kind(node) {
			NodeKind::Other => return true,
			NodeKind::Text => dom.parent(node),
			NodeKind::Element => Some(node.clone()),
		};
		while let Some(element) = current {
			if Some(&element) == root {
				return false;
			}
			if self.rejects_element(dom, &element) {
				return true;
			}
			current = dom.parent(&element);
		}
		false
	}

	/// [`TreeWalker`](`crate::dom::TreeWalker`) filter yielding the eligible text nodes of a subtree.
	///
	/// Rejected elements prune their subtree, so every yielded text node has a clean path up to the walk's root.
	pub fn text_filter<D: Dom + ?Sized>(&self, dom: &D, node: &D::Node) -> Filter {
		match dom.kind(node) {
			NodeKind::Text => Filter::Accept,
			NodeKind::Element if self.rejects_element(dom, node) => Filter::Reject,
			NodeKind::Element => Filter::Skip,
			NodeKind::Other => Filter::Reject,
		}
	}
}
