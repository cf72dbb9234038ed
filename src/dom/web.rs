//! The browser backend, and the glue that drives a [`ChangeObserver`] from a page.

use super::{Dom, Fingerprint, NodeKind, NodeStates};
use crate::{
	config::HighlightConfig,
	error::DomError,
	highlighter::Highlighter,
	keyword::KeywordSet,
	observer::{ChangeObserver, Mutation},
};
use core::cell::{Cell, RefCell};
use js_sys::{Array, Object, WeakMap};
use std::{borrow::Cow, rc::Rc};
use tracing::{error, trace, warn};
use wasm_bindgen::{closure::Closure, prelude::*, JsCast};
use web_sys::{Document, Element, HtmlElement, MutationObserver, MutationObserverInit, MutationRecord, Node, NodeList, Window};

/// A live [`web_sys::Document`].
#[derive(Debug, Clone)]
pub struct WebDom {
	document: Document,
}

impl WebDom {
	#[must_use]
	pub fn new(document: Document) -> Self {
		Self { document }
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.document
	}
}

fn js_error(error: JsValue) -> DomError {
	DomError::Js(error.as_string().unwrap_or_else(|| format!("{:?}", error)))
}

impl Dom for WebDom {
	type Node = Node;
	type States = WeakMapStates;

	fn new_states(&self) -> Self::States {
		WeakMapStates(WeakMap::new())
	}

	fn body(&self) -> Option<Node> {
		self.document.body().map(Into::into)
	}

	fn kind(&self, node: &Node) -> NodeKind {
		match node.node_type() {
			Node::ELEMENT_NODE => NodeKind::Element,
			Node::TEXT_NODE => NodeKind::Text,
			_ => NodeKind::Other,
		}
	}

	fn parent(&self, node: &Node) -> Option<Node> {
		node.parent_node()
	}

	fn first_child(&self, node: &Node) -> Option<Node> {
		node.first_child()
	}

	fn next_sibling(&self, node: &Node) -> Option<Node> {
		node.next_sibling()
	}

	fn tag_name(&self, node: &Node) -> Option<Cow<'_, str>> {
		// SVG and MathML report lower-case names.
		node.dyn_ref::<Element>().map(|element| Cow::Owned(element.tag_name().to_ascii_uppercase()))
	}

	fn has_class(&self, node: &Node, class: &str) -> bool {
		node.dyn_ref::<Element>().map_or(false, |element| element.class_list().contains(class))
	}

	fn is_content_editable(&self, node: &Node) -> bool {
		node.dyn_ref::<HtmlElement>()
			.map_or(false, |element| matches!(element.content_editable().as_str(), "true" | "plaintext-only"))
	}

	fn text(&self, node: &Node) -> Option<String> {
		if node.node_type() == Node::TEXT_NODE {
			node.node_value()
		} else {
			None
		}
	}

	fn text_content(&self, node: &Node) -> String {
		node.text_content().unwrap_or_default()
	}

	fn is_connected(&self, node: &Node) -> bool {
		node.is_connected()
	}

	fn create_text(&mut self, data: &str) -> Result<Node, DomError> {
		Ok(self.document.create_text_node(data).into())
	}

	fn create_element(&mut self, tag: &str) -> Result<Node, DomError> {
		self.document.create_element(tag).map(Into::into).map_err(js_error)
	}

	fn set_class_name(&mut self, element: &Node, class_name: &str) -> Result<(), DomError> {
		element
			.dyn_ref::<Element>()
			.ok_or(DomError::Hierarchy("not an element"))?
			.set_class_name(class_name);
		Ok(())
	}

	fn append_child(&mut self, parent: &Node, child: &Node) -> Result<(), DomError> {
		parent.append_child(child).map(drop).map_err(js_error)
	}

	fn replace_with(&mut self, node: &Node, replacements: &[Node]) -> Result<(), DomError> {
		let parent = node.parent_node().ok_or(DomError::NoParent)?;
		for replacement in replacements {
			parent.insert_before(replacement, Some(node)).map_err(js_error)?;
		}
		parent.remove_child(node).map(drop).map_err(js_error)
	}

	fn remove(&mut self, node: &Node) -> Result<(), DomError> {
		match node.parent_node() {
			Some(parent) => parent.remove_child(node).map(drop).map_err(js_error),
			None => Ok(()),
		}
	}

	fn normalize(&mut self, node: &Node) -> Result<(), DomError> {
		node.normalize();
		Ok(())
	}
}

/// Node states in a JavaScript `WeakMap`, which lets the garbage collector drop entries with their nodes.
#[derive(Debug)]
pub struct WeakMapStates(WeakMap);

impl NodeStates<Node> for WeakMapStates {
	fn get(&self, node: &Node) -> Option<Fingerprint> {
		let key: &Object = node.as_ref();
		// Stored as hexadecimal strings, since `f64` can't hold every `u64`.
		self.0.get(key).as_string().and_then(|hex| u64::from_str_radix(&hex, 16).ok())
	}

	fn set(&mut self, node: &Node, fingerprint: Fingerprint) {
		let key: &Object = node.as_ref();
		self.0.set(key, &JsValue::from_str(&format!("{:x}", fingerprint)));
	}

	fn remove(&mut self, node: &Node) {
		let key: &Object = node.as_ref();
		self.0.delete(key);
	}

	fn clear(&mut self) {
		self.0 = WeakMap::new();
	}
}

/// Converts a `MutationObserver` callback's records. Record types other than `childList` and `characterData` are
/// dropped.
#[must_use]
pub fn convert_records(records: &Array) -> Vec<Mutation<Node>> {
	records
		.iter()
		.filter_map(|record| record.dyn_into::<MutationRecord>().ok())
		.filter_map(|record| convert_record(&record))
		.collect()
}

fn convert_record(record: &MutationRecord) -> Option<Mutation<Node>> {
	let target = record.target()?;
	match record.type_().as_str() {
		"childList" => Some(Mutation::ChildList {
			target,
			added: node_list(&record.added_nodes()),
			removed: node_list(&record.removed_nodes()),
		}),
		"characterData" => Some(Mutation::CharacterData { target }),
		_ => None,
	}
}

fn node_list(list: &NodeList) -> Vec<Node> {
	(0..list.length()).filter_map(|i| list.get(i)).collect()
}

struct PageState {
	window: Window,
	dom: WebDom,
	observer: ChangeObserver<WebDom>,
}

impl PageState {
	fn on_frame(&mut self) {
		match self.window.location().href() {
			Ok(href) => {
				self.observer.location_changed(&mut self.dom, &href);
			}
			Err(error) => warn!("Failed to read the location: {:?}", error),
		}
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let now_ms = js_sys::Date::now() as u64;
		self.observer.tick(&mut self.dom, now_ms);
	}
}

/// Highlighting for the current page, for use from the extension's content script.
///
/// Watches the document with a `MutationObserver` and works off pending changes once per animation frame.
/// Dropping (or `free`ing) it stops both, but leaves existing markers in place.
#[wasm_bindgen]
pub struct PageHighlighter {
	state: Rc<RefCell<PageState>>,
	mutation_observer: MutationObserver,
	_on_mutations: Closure<dyn FnMut(Array, MutationObserver)>,
	frame: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>,
	frame_id: Rc<Cell<i32>>,
}

#[wasm_bindgen]
impl PageHighlighter {
	/// Attaches to the current window's document. `config_json` may be a partial [`HighlightConfig`].
	///
	/// # Errors
	///
	/// Iff there is no window or document, the configuration is malformed, or observing fails.
	#[wasm_bindgen(constructor)]
	pub fn new(config_json: Option<String>) -> Result<PageHighlighter, JsValue> {
		let window = web_sys::window().ok_or_else(|| JsValue::from_str("highlight-dom: No window."))?;
		let document = window.document().ok_or_else(|| JsValue::from_str("highlight-dom: No document."))?;
		let config = match config_json {
			Some(json) => HighlightConfig::from_json(&json).map_err(|error| JsValue::from_str(&error.to_string()))?,
			None => HighlightConfig::default(),
		};

		let dom = WebDom::new(document.clone());
		let observer = ChangeObserver::new(&dom, Highlighter::new(&dom, config));
		let state = Rc::new(RefCell::new(PageState { window: window.clone(), dom, observer }));

		let on_mutations = {
			let state = Rc::clone(&state);
			Closure::wrap(Box::new(move |records: Array, _: MutationObserver| {
				let mutations = convert_records(&records);
				trace!("Received {} mutation record(s).", mutations.len());
				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let now_ms = js_sys::Date::now() as u64;
				match state.try_borrow_mut() {
					Ok(mut state) => {
						let PageState { dom, observer, .. } = &mut *state;
						observer.record_mutations(dom, mutations, now_ms);
					}
					Err(_) => error!("Mutation records delivered re-entrantly. Dropping them."),
				}
			}) as Box<dyn FnMut(Array, MutationObserver)>)
		};
		let mutation_observer = MutationObserver::new(on_mutations.as_ref().unchecked_ref())?;
		let root = document.document_element().ok_or_else(|| JsValue::from_str("highlight-dom: No document element."))?;
		let mut init = MutationObserverInit::new();
		#[allow(deprecated)]
		init.child_list(true).subtree(true).character_data(true);
		mutation_observer.observe_with_options(&root, &init)?;

		let frame: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::default();
		let frame_id = Rc::new(Cell::new(0));
		{
			let state = Rc::clone(&state);
			let frame_handle = Rc::clone(&frame);
			let frame_id = Rc::clone(&frame_id);
			*frame.borrow_mut() = Some(Closure::wrap(Box::new(move |_: f64| {
				let window = if let Ok(mut state) = state.try_borrow_mut() {
					state.on_frame();
					state.window.clone()
				} else {
					error!("Animation frame re-entered. Stopping.");
					return;
				};
				if let Some(closure) = frame_handle.borrow().as_ref() {
					match window.request_animation_frame(closure.as_ref().unchecked_ref()) {
						Ok(id) => frame_id.set(id),
						Err(error) => error!("Failed to request the next animation frame: {:?}", error),
					}
				}
			}) as Box<dyn FnMut(f64)>));
		}
		if let Some(closure) = frame.borrow().as_ref() {
			frame_id.set(window.request_animation_frame(closure.as_ref().unchecked_ref())?);
		}

		Ok(Self {
			state,
			mutation_observer,
			_on_mutations: on_mutations,
			frame,
			frame_id,
		})
	}

	/// Replaces the keywords with a JSON array of `{ words, colour, categoryIndex }` entries.
	///
	/// # Errors
	///
	/// Iff `json` is not an array of objects.
	#[wasm_bindgen(js_name = setKeywords)]
	pub fn set_keywords(&self, json: &str) -> Result<(), JsValue> {
		let keywords = KeywordSet::from_json(json).map_err(|error| JsValue::from_str(&error.to_string()))?;
		let mut state = self.state.try_borrow_mut().map_err(|_| JsValue::from_str("highlight-dom: Busy."))?;
		let PageState { dom, observer, .. } = &mut *state;
		observer.set_keywords(dom, keywords);
		Ok(())
	}

	/// # Errors
	///
	/// Iff called re-entrantly from within highlighting.
	#[wasm_bindgen(js_name = setEnabled)]
	pub fn set_enabled(&self, enabled: bool) -> Result<(), JsValue> {
		let mut state = self.state.try_borrow_mut().map_err(|_| JsValue::from_str("highlight-dom: Busy."))?;
		let PageState { dom, observer, .. } = &mut *state;
		observer.set_enabled(dom, enabled);
		Ok(())
	}

	/// Clears and rebuilds all highlights, e.g. after a category color changed.
	///
	/// # Errors
	///
	/// Iff called re-entrantly from within highlighting.
	pub fn reapply(&self) -> Result<(), JsValue> {
		let mut state = self.state.try_borrow_mut().map_err(|_| JsValue::from_str("highlight-dom: Busy."))?;
		let PageState { dom, observer, .. } = &mut *state;
		observer.reapply(dom);
		Ok(())
	}
}

impl Drop for PageHighlighter {
	fn drop(&mut self) {
		self.mutation_observer.disconnect();
		if let Ok(state) = self.state.try_borrow() {
			if let Err(error) = state.window.cancel_animation_frame(self.frame_id.get()) {
				warn!("Failed to cancel the pending animation frame: {:?}", error);
			}
		}
		// Breaks the frame closure's reference cycle.
		self.frame.borrow_mut().take();
	}
}
