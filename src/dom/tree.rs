//! An in-memory document, for running the engine outside of a browser.
//!
//! Node handles are generational: once a node leaves the tree through [`Dom::remove`] or [`Dom::replace_with`],
//! it is freed and its [`NodeId`] is dead for good, even if the slot is reused.
//! This gives [`WeakStates`] the same auto-expiring behavior a `WeakMap` has in the browser.
//!
//! Like a browser's `MutationObserver`, the document can queue [`Mutation`] records of every change,
//! including the ones made by the engine itself. See [`Document::observe`].

use super::{Dom, Filter, Fingerprint, NodeKind, NodeStates, TreeWalker};
use crate::{error::DomError, observer::Mutation};
use core::{cell::RefCell, fmt::Write as _};
use hashbrown::HashMap;
use std::{borrow::Cow, rc::Rc};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
	index: u32,
	generation: u32,
}

#[derive(Debug)]
enum Data {
	Element { tag: String, class_name: String, content_editable: bool },
	Text(String),
	Comment(String),
}

#[derive(Debug)]
struct NodeData {
	data: Data,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// Current generation per slot, shared with [`WeakStates`] so they can tell dead nodes apart.
type Generations = Rc<RefCell<Vec<u32>>>;

#[derive(Debug)]
pub struct Document {
	slots: Vec<Option<NodeData>>,
	generations: Generations,
	free: Vec<u32>,
	document_element: NodeId,
	body: NodeId,
	mutation_count: u64,
	observing: bool,
	records: Vec<Mutation<NodeId>>,
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl Document {
	/// Creates an empty `<html><body></body></html>` document.
	#[must_use]
	pub fn new() -> Self {
		let mut document = Self {
			slots: Vec::new(),
			generations: Rc::default(),
			free: Vec::new(),
			document_element: NodeId { index: 0, generation: 0 },
			body: NodeId { index: 0, generation: 0 },
			mutation_count: 0,
			observing: false,
			records: Vec::new(),
		};
		document.document_element = document.alloc(Data::Element {
			tag: "HTML".to_owned(),
			class_name: String::new(),
			content_editable: false,
		});
		document.body = document.alloc(Data::Element {
			tag: "BODY".to_owned(),
			class_name: String::new(),
			content_editable: false,
		});
		document.link(document.document_element, document.body, None);
		document
	}

	#[must_use]
	pub fn document_element(&self) -> NodeId {
		self.document_element
	}

	/// Number of changes made to the tree so far, by anyone.
	#[must_use]
	pub fn mutation_count(&self) -> u64 {
		self.mutation_count
	}

	/// Starts or stops queueing [`Mutation`] records.
	pub fn observe(&mut self, observing: bool) {
		self.observing = observing;
		if !observing {
			self.records.clear();
		}
	}

	/// Drains the queued [`Mutation`] records.
	pub fn take_records(&mut self) -> Vec<Mutation<NodeId>> {
		core::mem::take(&mut self.records)
	}

	/// Whether `node` still exists, attached or not.
	#[must_use]
	pub fn is_alive(&self, node: NodeId) -> bool {
		self.get(node).is_some()
	}

	/// Appends a new element with the given tag to `parent`.
	///
	/// # Errors
	///
	/// Iff `parent` is dead or not an element.
	pub fn append_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId, DomError> {
		let element = self.create_element(tag)?;
		self.append_child(&parent, &element)?;
		Ok(element)
	}

	/// Appends a new text node to `parent`.
	///
	/// # Errors
	///
	/// Iff `parent` is dead or not an element.
	pub fn append_text(&mut self, parent: NodeId, data: &str) -> Result<NodeId, DomError> {
		let text = self.create_text(data)?;
		self.append_child(&parent, &text)?;
		Ok(text)
	}

	/// Appends a new comment to `parent`.
	///
	/// # Errors
	///
	/// Iff `parent` is dead or not an element.
	pub fn append_comment(&mut self, parent: NodeId, data: &str) -> Result<NodeId, DomError> {
		let comment = self.alloc(Data::Comment(data.to_owned()));
		self.append_child(&parent, &comment)?;
		Ok(comment)
	}

	/// Replaces the data of a text node, like assigning `CharacterData.data`.
	///
	/// # Errors
	///
	/// Iff `node` is dead or not a text node.
	pub fn set_text(&mut self, node: NodeId, data: &str) -> Result<(), DomError> {
		match self.get_mut(node) {
			Some(NodeData { data: Data::Text(text), .. }) => {
				data.clone_into(text);
			}
			Some(_) => return Err(DomError::Hierarchy("not a text node")),
			None => return Err(DomError::Detached),
		}
		self.record(Mutation::CharacterData { target: node });
		Ok(())
	}

	/// Sets or clears the element's own `contenteditable` flag.
	///
	/// # Errors
	///
	/// Iff `node` is dead or not an element.
	pub fn set_content_editable(&mut self, node: NodeId, editable: bool) -> Result<(), DomError> {
		match self.get_mut(node) {
			Some(NodeData {
				data: Data::Element { content_editable, .. },
				..
			}) => {
				*content_editable = editable;
				Ok(())
			}
			Some(_) => Err(DomError::Hierarchy("not an element")),
			None => Err(DomError::Detached),
		}
	}

	/// Serializes the subtree at `node` as HTML. Dead nodes serialize as the empty string.
	#[must_use]
	pub fn to_html(&self, node: NodeId) -> String {
		let mut html = String::new();
		self.write_html(node, &mut html);
		html
	}

	fn write_html(&self, node: NodeId, html: &mut String) {
		let node = match self.get(node) {
			Some(node) => node,
			None => return,
		};
		match &node.data {
			Data::Text(text) => escape_into(text, html),
			Data::Comment(comment) => {
				let _ = write!(html, "<!--{}-->", comment);
			}
			Data::Element { tag, class_name, content_editable } => {
				let tag = tag.to_ascii_lowercase();
				html.push('<');
				html.push_str(&tag);
				if !class_name.is_empty() {
					html.push_str(" class=\"");
					escape_into(class_name, html);
					html.push('"');
				}
				if *content_editable {
					html.push_str(" contenteditable=\"true\"");
				}
				html.push('>');
				for &child in &node.children {
					self.write_html(child, html);
				}
				let _ = write!(html, "</{}>", tag);
			}
		}
	}

	fn get(&self, id: NodeId) -> Option<&NodeData> {
		if self.generations.borrow().get(id.index as usize) != Some(&id.generation) {
			return None;
		}
		self.slots.get(id.index as usize)?.as_ref()
	}

	fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
		if self.generations.borrow().get(id.index as usize) != Some(&id.generation) {
			return None;
		}
		self.slots.get_mut(id.index as usize)?.as_mut()
	}

	fn alloc(&mut self, data: Data) -> NodeId {
		let node = NodeData { data, parent: None, children: Vec::new() };
		match self.free.pop() {
			Some(index) => {
				self.slots[index as usize] = Some(node);
				let generation = self.generations.borrow()[index as usize];
				NodeId { index, generation }
			}
			None => {
				#[allow(clippy::cast_possible_truncation)]
				let index = self.slots.len() as u32;
				self.slots.push(Some(node));
				self.generations.borrow_mut().push(0);
				NodeId { index, generation: 0 }
			}
		}
	}

	/// Frees `root` and everything below it. Their ids die.
	fn free_subtree(&mut self, root: NodeId) {
		let mut stack = vec![root];
		while let Some(id) = stack.pop() {
			if self.get(id).is_none() {
				continue;
			}
			if let Some(node) = self.slots[id.index as usize].take() {
				stack.extend(node.children);
			}
			let mut generations = self.generations.borrow_mut();
			generations[id.index as usize] = generations[id.index as usize].wrapping_add(1);
			self.free.push(id.index);
		}
	}

	/// Inserts an already detached `child` below `parent`, before `before` or at the end.
	fn link(&mut self, parent: NodeId, child: NodeId, before: Option<usize>) {
		if let Some(parent_node) = self.get_mut(parent) {
			match before {
				Some(index) => parent_node.children.insert(index, child),
				None => parent_node.children.push(child),
			}
		}
		if let Some(child_node) = self.get_mut(child) {
			child_node.parent = Some(parent);
		}
	}

	/// Detaches `child` from its parent, if any, without freeing it.
	fn unlink(&mut self, child: NodeId) {
		let parent = match self.get_mut(child).and_then(|node| node.parent.take()) {
			Some(parent) => parent,
			None => return,
		};
		if let Some(parent_node) = self.get_mut(parent) {
			parent_node.children.retain(|&sibling| sibling != child);
		}
	}

	fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
		loop {
			if node == ancestor {
				return true;
			}
			node = match self.get(node).and_then(|node| node.parent) {
				Some(parent) => parent,
				None => return false,
			}
		}
	}

	fn record(&mut self, mutation: Mutation<NodeId>) {
		self.mutation_count += 1;
		if self.observing {
			self.records.push(mutation);
		}
	}
}

fn escape_into(text: &str, html: &mut String) {
	for c in text.chars() {
		match c {
			'&' => html.push_str("&amp;"),
			'<' => html.push_str("&lt;"),
			'>' => html.push_str("&gt;"),
			'"' => html.push_str("&quot;"),
			c => html.push(c),
		}
	}
}

impl Dom for Document {
	type Node = NodeId;
	type States = WeakStates;

	fn new_states(&self) -> Self::States {
		WeakStates {
			entries: HashMap::new(),
			generations: Rc::clone(&self.generations),
			prune_at: WeakStates::MIN_PRUNE_AT,
		}
	}

	fn body(&self) -> Option<NodeId> {
		Some(self.body).filter(|&body| self.is_alive(body))
	}

	fn kind(&self, node: &NodeId) -> NodeKind {
		match self.get(*node).map(|node| &node.data) {
			Some(Data::Element { .. }) => NodeKind::Element,
			Some(Data::Text(_)) => NodeKind::Text,
			Some(Data::Comment(_)) | None => NodeKind::Other,
		}
	}

	fn parent(&self, node: &NodeId) -> Option<NodeId> {
		self.get(*node)?.parent
	}

	fn first_child(&self, node: &NodeId) -> Option<NodeId> {
		self.get(*node)?.children.first().copied()
	}

	fn next_sibling(&self, node: &NodeId) -> Option<NodeId> {
		let parent = self.get(self.get(*node)?.parent?)?;
		let index = parent.children.iter().position(|child| child == node)?;
		parent.children.get(index + 1).copied()
	}

	fn children(&self, node: &NodeId) -> Vec<NodeId> {
		self.get(*node).map(|node| node.children.clone()).unwrap_or_default()
	}

	fn tag_name(&self, node: &NodeId) -> Option<Cow<'_, str>> {
		match &self.get(*node)?.data {
			Data::Element { tag, .. } => Some(Cow::Borrowed(tag)),
			_ => None,
		}
	}

	fn has_class(&self, node: &NodeId, class: &str) -> bool {
		match self.get(*node).map(|node| &node.data) {
			Some(Data::Element { class_name, .. }) => class_name.split_ascii_whitespace().any(|c| c == class),
			_ => false,
		}
	}

	fn is_content_editable(&self, node: &NodeId) -> bool {
		matches!(
			self.get(*node).map(|node| &node.data),
			Some(Data::Element { content_editable: true, .. })
		)
	}

	fn text(&self, node: &NodeId) -> Option<String> {
		match &self.get(*node)?.data {
			Data::Text(text) => Some(text.clone()),
			_ => None,
		}
	}

	fn is_connected(&self, node: &NodeId) -> bool {
		self.is_inclusive_ancestor(self.document_element, *node)
	}

	fn create_text(&mut self, data: &str) -> Result<NodeId, DomError> {
		Ok(self.alloc(Data::Text(data.to_owned())))
	}

	fn create_element(&mut self, tag: &str) -> Result<NodeId, DomError> {
		if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
			return Err(DomError::Hierarchy("invalid tag name"));
		}
		Ok(self.alloc(Data::Element {
			tag: tag.to_ascii_uppercase(),
			class_name: String::new(),
			content_editable: false,
		}))
	}

	fn set_class_name(&mut self, element: &NodeId, value: &str) -> Result<(), DomError> {
		match self.get_mut(*element) {
			Some(NodeData {
				data: Data::Element { class_name, .. },
				..
			}) => {
				value.clone_into(class_name);
				Ok(())
			}
			Some(_) => Err(DomError::Hierarchy("not an element")),
			None => Err(DomError::Detached),
		}
	}

	fn append_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), DomError> {
		match self.get(*parent).map(|node| &node.data) {
			Some(Data::Element { .. }) => (),
			Some(_) => return Err(DomError::Hierarchy("parent is not an element")),
			None => return Err(DomError::Detached),
		}
		if !self.is_alive(*child) {
			return Err(DomError::Detached);
		}
		if self.is_inclusive_ancestor(*child, *parent) {
			return Err(DomError::Hierarchy("cannot append a node to itself or its descendant"));
		}
		self.unlink(*child);
		self.link(*parent, *child, None);
		self.record(Mutation::ChildList {
			target: *parent,
			added: vec![*child],
			removed: Vec::new(),
		});
		Ok(())
	}

	fn replace_with(&mut self, node: &NodeId, replacements: &[NodeId]) -> Result<(), DomError> {
		let parent = self.get(*node).ok_or(DomError::Detached)?.parent.ok_or(DomError::NoParent)?;
		for &replacement in replacements {
			if !self.is_alive(replacement) {
				return Err(DomError::Detached);
			}
			if replacement == *node || self.is_inclusive_ancestor(replacement, parent) {
				return Err(DomError::Hierarchy("replacement contains the replaced node's parent"));
			}
		}

		for &replacement in replacements {
			self.unlink(replacement);
		}
		let index = self
			.get(parent)
			.and_then(|parent| parent.children.iter().position(|child| child == node))
			.ok_or(DomError::NoParent)?;
		for (offset, &replacement) in replacements.iter().enumerate() {
			self.link(parent, replacement, Some(index + offset));
		}
		self.unlink(*node);
		self.free_subtree(*node);

		self.record(Mutation::ChildList {
			target: parent,
			added: replacements.to_vec(),
			removed: vec![*node],
		});
		Ok(())
	}

	fn remove(&mut self, node: &NodeId) -> Result<(), DomError> {
		let parent = self.get(*node).ok_or(DomError::Detached)?.parent;
		self.unlink(*node);
		self.free_subtree(*node);
		if let Some(parent) = parent {
			self.record(Mutation::ChildList {
				target: parent,
				added: Vec::new(),
				removed: vec![*node],
			});
		}
		Ok(())
	}

	fn normalize(&mut self, node: &NodeId) -> Result<(), DomError> {
		if !self.is_alive(*node) {
			return Err(DomError::Detached);
		}
		let elements: Vec<NodeId> = TreeWalker::new(&*self, *node, |dom: &Self, node: &NodeId| match dom.kind(node) {
			NodeKind::Element => Filter::Accept,
			_ => Filter::Reject,
		})
		.collect();

		let mut merged = 0_usize;
		for element in elements {
			let mut previous_text: Option<NodeId> = None;
			for child in self.children(&element) {
				let data = match self.text(&child) {
					Some(data) => data,
					None => {
						previous_text = None;
						continue;
					}
				};
				match previous_text {
					Some(previous) if !data.is_empty() => {
						if let Some(NodeData { data: Data::Text(text), .. }) = self.get_mut(previous) {
							text.push_str(&data);
						}
						self.record(Mutation::CharacterData { target: previous });
						self.remove(&child)?;
						merged += 1;
					}
					_ if data.is_empty() => {
						self.remove(&child)?;
						merged += 1;
					}
					_ => previous_text = Some(child),
				}
			}
		}
		if merged > 0 {
			trace!("Normalized {} text node(s) away.", merged);
		}
		Ok(())
	}
}

/// Fingerprints of [`Document`] nodes, dropped automatically when their node dies.
#[derive(Debug)]
pub struct WeakStates {
	entries: HashMap<NodeId, Fingerprint>,
	generations: Generations,
	prune_at: usize,
}

impl WeakStates {
	const MIN_PRUNE_AT: usize = 64;

	fn is_alive(&self, node: NodeId) -> bool {
		self.generations.borrow().get(node.index as usize) == Some(&node.generation)
	}

	/// Number of physically stored entries, dead ones included until the next prune.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl NodeStates<NodeId> for WeakStates {
	fn get(&self, node: &NodeId) -> Option<Fingerprint> {
		if !self.is_alive(*node) {
			return None;
		}
		self.entries.get(node).copied()
	}

	fn set(&mut self, node: &NodeId, fingerprint: Fingerprint) {
		if !self.is_alive(*node) {
			return;
		}
		self.entries.insert(*node, fingerprint);
		if self.entries.len() >= self.prune_at {
			self.prune();
			self.prune_at = (self.entries.len() * 2).max(Self::MIN_PRUNE_AT);
		}
	}

	fn remove(&mut self, node: &NodeId) {
		self.entries.remove(node);
	}

	fn clear(&mut self) {
		self.entries.clear();
		self.prune_at = Self::MIN_PRUNE_AT;
	}

	fn prune(&mut self) -> usize {
		let generations = self.generations.borrow();
		let before = self.entries.len();
		self.entries
			.retain(|node, _| generations.get(node.index as usize) == Some(&node.generation));
		before - self.entries.len()
	}
}
