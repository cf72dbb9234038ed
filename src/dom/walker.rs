use super::Dom;

/// What a [`TreeWalker`] does with a node, after the DOM's `NodeFilter` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
	/// Yield the node and descend into it.
	Accept,
	/// Don't yield the node, but descend into it.
	Skip,
	/// Neither yield the node nor descend into it.
	Reject,
}

/// Iterative pre-order traversal of the subtree at `root`, `root` included.
///
/// The tree must not be modified while walking. Collect first, then rewrite.
pub struct TreeWalker<'a, D: Dom + ?Sized, F> {
	dom: &'a D,
	root: D::Node,
	next: Option<D::Node>,
	filter: F,
}

impl<'a, D, F> TreeWalker<'a, D, F>
where
	D: Dom + ?Sized,
	F: FnMut(&D, &D::Node) -> Filter,
{
	pub fn new(dom: &'a D, root: D::Node, filter: F) -> Self {
		Self {
			dom,
			next: Some(root.clone()),
			root,
			filter,
		}
	}

	/// The node after `node` in pre-order, ignoring `node`'s descendants, without leaving the subtree at `root`.
	fn following(&self, node: &D::Node) -> Option<D::Node> {
		let mut current = node.clone();
		loop {
			if current == self.root {
				return None;
			}
			if let Some(sibling) = self.dom.next_sibling(&current) {
				return Some(sibling);
			}
			current = self.dom.parent(&current)?;
		}
	}
}

impl<'a, D, F> Iterator for TreeWalker<'a, D, F>
where
	D: Dom + ?Sized,
	F: FnMut(&D, &D::Node) -> Filter,
{
	type Item = D::Node;

	fn next(&mut self) -> Option<Self::Item> {
		while let Some(node) = self.next.take() {
			let filter = (self.filter)(self.dom, &node);
			self.next = match filter {
				Filter::Reject => self.following(&node),
				Filter::Accept | Filter::Skip => self.dom.first_child(&node).or_else(|| self.following(&node)),
			};
			if filter == Filter::Accept {
				return Some(node);
			}
		}
		None
	}
}
