#![cfg(target_arch = "wasm32")]

use highlight_dom::{
	dom::{
		web::{PageHighlighter, WebDom},
		Dom as _, NodeStates as _,
	},
	HighlightConfig, Highlighter, Keyword, KeywordSet,
};
use std::sync::Once;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlBodyElement, Node};

wasm_bindgen_test_configure!(run_in_browser);

static LOG_INIT: Once = Once::new();

fn body() -> HtmlBodyElement {
	LOG_INIT.call_once(tracing_wasm::set_as_global_default);
	window().unwrap().document().unwrap().body().unwrap().dyn_into::<HtmlBodyElement>().unwrap()
}

#[wasm_bindgen_test]
fn highlight_and_clear() {
	let body = body();
	let original = "<p>Rust and <script>Rust</script><textarea>Rust</textarea></p>";
	body.set_inner_html(original);

	let mut dom = WebDom::new(window().unwrap().document().unwrap());
	let root: Node = body.clone().into();
	let mut highlighter = Highlighter::new(&dom, HighlightConfig::default());
	let keywords = KeywordSet::new(vec![Keyword::new("Rust", 4, 0)]);

	let stats = highlighter.highlight(&mut dom, &root, &keywords);
	assert_eq!(stats.markers, 1);
	assert_eq!(
		body.inner_html(),
		concat!(
			r#"<p><span class="chrome-extension-mutihighlight chrome-extension-mutihighlight-style-4">Rust</span>"#,
			" and <script>Rust</script><textarea>Rust</textarea></p>",
		)
	);

	assert_eq!(highlighter.highlight(&mut dom, &root, &keywords).markers, 0);

	assert_eq!(highlighter.clear_highlight(&mut dom, &root), 1);
	assert_eq!(body.inner_html(), original);
	body.set_inner_html("");
}

#[wasm_bindgen_test]
fn weak_map_states() {
	let body = body();
	let dom = WebDom::new(window().unwrap().document().unwrap());
	let mut states = dom.new_states();
	let node: Node = body.clone().into();

	assert_eq!(states.get(&node), None);
	states.set(&node, u64::MAX);
	assert_eq!(states.get(&node), Some(u64::MAX));
	states.remove(&node);
	assert_eq!(states.get(&node), None);
	states.set(&node, 7);
	states.clear();
	assert_eq!(states.get(&node), None);
}

#[wasm_bindgen_test]
fn page_highlighter_lifecycle() {
	let body = body();
	body.set_inner_html("<p>lorem ipsum</p>");

	let page = PageHighlighter::new(Some(r#"{ "caseSensitive": false }"#.to_owned())).unwrap();
	page.set_keywords(r#"[{ "words": "LOREM", "colour": 2, "categoryIndex": 0 }]"#).unwrap();
	assert!(page.set_keywords(r#"{ "words": "LOREM" }"#).is_err());
	page.set_enabled(true).unwrap();
	page.reapply().unwrap();
	page.set_enabled(false).unwrap();
	drop(page);

	assert_eq!(body.inner_html(), "<p>lorem ipsum</p>");
	body.set_inner_html("");

	assert!(PageHighlighter::new(Some("{".to_owned())).is_err());
}
