use highlight_dom::{
	dom::{
		tree::{Document, NodeId},
		Dom as _, NodeStates as _,
	},
	filter::NodeFilter,
	HighlightConfig, Highlighter, Keyword, KeywordSet, Progress,
};
use std::{cell::RefCell, rc::Rc};
use tracing_subscriber::EnvFilter;

fn init_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

const MARKER: &str = "chrome-extension-mutihighlight";

fn marker(color: u32, text: &str) -> String {
	format!(
		r#"<span class="{} {}-style-{}">{}</span>"#,
		MARKER, MARKER, color, text
	)
}

fn keywords(entries: &[(&str, u32)]) -> KeywordSet {
	KeywordSet::new(
		entries
			.iter()
			.enumerate()
			.map(|(i, &(text, color))| Keyword::new(text, color, i)),
	)
}

fn paragraph(document: &mut Document, text: &str) -> NodeId {
	let body = document.body().unwrap();
	let p = document.append_element(body, "P").unwrap();
	document.append_text(p, text).unwrap();
	p
}

#[test]
fn wraps_each_match_in_a_marker() {
	init_logging();
	let mut document = Document::new();
	let body = document.body().unwrap();
	let p = paragraph(&mut document, "Rust is fast. rust is safe. Rust!");

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let stats = highlighter.highlight(&mut document, &body, &keywords(&[("Rust", 3)]));

	assert_eq!(stats.text_nodes, 1);
	assert_eq!(stats.rewritten, 1);
	assert_eq!(stats.markers, 2);
	assert_eq!(
		document.to_html(p),
		format!(
			"<p>{} is fast. rust is safe. {}!</p>",
			marker(3, "Rust"),
			marker(3, "Rust")
		)
	);
}

#[test]
fn case_insensitive_markers_keep_the_page_text() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	let p = paragraph(&mut document, "RUST and rust");

	let config = HighlightConfig {
		case_sensitive: false,
		..HighlightConfig::default()
	};
	let mut highlighter = Highlighter::new(&document, config);
	highlighter.highlight(&mut document, &body, &keywords(&[("Rust", 2)]));

	assert_eq!(
		document.to_html(p),
		format!("<p>{} and {}</p>", marker(2, "RUST"), marker(2, "rust"))
	);
}

#[test]
fn case_insensitive_matches_beyond_ascii_are_not_prefiltered_away() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	let p = paragraph(&mut document, "s");

	let config = HighlightConfig {
		case_sensitive: false,
		..HighlightConfig::default()
	};
	let mut highlighter = Highlighter::new(&document, config);
	let stats = highlighter.highlight(&mut document, &body, &keywords(&[("\u{17F}", 1)]));

	assert_eq!(stats.markers, 1);
	assert_eq!(document.to_html(p), format!("<p>{}</p>", marker(1, "s")));
}

#[test]
fn text_content_is_preserved() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	paragraph(&mut document, "The quick brown fox jumps over the lazy dog.");
	paragraph(&mut document, "Brown foxes & <lazy> dogs");
	let before = document.text_content(&body);

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let stats = highlighter.highlight(&mut document, &body, &keywords(&[("fox", 1), ("lazy", 2), ("dog", 3), ("o", 4)]));
	assert!(stats.markers > 0);
	assert_eq!(document.text_content(&body), before);
}

#[test]
fn second_pass_is_a_no_op() {
	init_logging();
	let mut document = Document::new();
	let body = document.body().unwrap();
	paragraph(&mut document, "alpha beta gamma");
	paragraph(&mut document, "beta");
	paragraph(&mut document, "nothing to see");
	let keywords = keywords(&[("beta", 1), ("gamma", 2)]);

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let first = highlighter.highlight(&mut document, &body, &keywords);
	assert_eq!(first.markers, 3);
	let html = document.to_html(body);
	let mutations = document.mutation_count();

	let second = highlighter.highlight(&mut document, &body, &keywords);
	assert_eq!(second.rewritten, 0);
	assert_eq!(second.markers, 0);
	assert_eq!(document.mutation_count(), mutations);
	assert_eq!(document.to_html(body), html);

	// Without cached states, markers are still never highlighted again.
	highlighter.clear_cache();
	let third = highlighter.highlight(&mut document, &body, &keywords);
	assert_eq!(third.markers, 0);
	assert_eq!(document.mutation_count(), mutations);
}

#[test]
fn skipped_regions_are_untouched() {
	let mut document = Document::new();
	let body = document.body().unwrap();

	let script = document.append_element(body, "SCRIPT").unwrap();
	document.append_text(script, "let key = 1;").unwrap();
	let style = document.append_element(body, "style").unwrap();
	document.append_text(style, ".key {}").unwrap();
	let textarea = document.append_element(body, "TEXTAREA").unwrap();
	document.append_text(textarea, "key").unwrap();
	let editable = document.append_element(body, "DIV").unwrap();
	document.set_content_editable(editable, true).unwrap();
	let inner = document.append_element(editable, "B").unwrap();
	document.append_text(inner, "key").unwrap();
	document.append_comment(body, "key").unwrap();
	let existing = document.append_element(body, "SPAN").unwrap();
	document.set_class_name(&existing, MARKER).unwrap();
	document.append_text(existing, "key").unwrap();
	let visible = paragraph(&mut document, "key");

	let before = document.to_html(body);
	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let stats = highlighter.highlight(&mut document, &body, &keywords(&[("key", 1)]));

	assert_eq!(stats.text_nodes, 1);
	assert_eq!(stats.markers, 1);
	assert_eq!(document.to_html(visible), format!("<p>{}</p>", marker(1, "key")));
	assert_eq!(
		document.to_html(body),
		before.replace("<p>key</p>", &format!("<p>{}</p>", marker(1, "key")))
	);
}

#[test]
fn roots_inside_skipped_regions_yield_empty_passes() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	let editable = document.append_element(body, "DIV").unwrap();
	document.set_content_editable(editable, true).unwrap();
	let child = document.append_element(editable, "P").unwrap();
	let text = document.append_text(child, "key").unwrap();

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let keywords = keywords(&[("key", 1)]);
	for root in [child, text].iter() {
		let pass = highlighter.begin_pass(&document, root, &keywords);
		assert_eq!(pass.remaining(), 0);
	}
	assert_eq!(highlighter.highlight(&mut document, &child, &keywords).markers, 0);
}

#[test]
fn node_filter_judges_ancestors_up_to_the_root() {
	let config = HighlightConfig::default();
	let filter = NodeFilter::new(&config);

	let mut document = Document::new();
	let body = document.body().unwrap();
	let noscript = document.append_element(body, "NOSCRIPT").unwrap();
	let deep = document.append_element(noscript, "DIV").unwrap();
	let text = document.append_text(deep, "x").unwrap();
	let comment = document.append_comment(body, "x").unwrap();
	let plain = paragraph(&mut document, "x");

	assert!(filter.should_skip(&document, &text, None));
	assert!(filter.should_skip(&document, &deep, None));
	assert!(!filter.should_skip(&document, &text, Some(&noscript)));
	assert!(filter.should_skip(&document, &comment, None));
	assert!(!filter.should_skip(&document, &plain, None));
	assert!(filter.rejects_element(&document, &noscript));
	assert!(!filter.rejects_element(&document, &deep));
}

#[test]
fn keyword_colors_and_fallback() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	let p = paragraph(&mut document, "one two three");

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	highlighter.highlight(&mut document, &body, &keywords(&[("one", 0), ("two", 20), ("three", 21)]));

	assert_eq!(
		document.to_html(p),
		format!("<p>{} {} {}</p>", marker(1, "one"), marker(20, "two"), marker(1, "three"))
	);
}

#[test]
fn clear_highlight_restores_the_original_tree() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	paragraph(&mut document, "Rust and WebAssembly and Rust");
	let list = document.append_element(body, "UL").unwrap();
	for item in &["Rust", "no match", "WebAssembly!"] {
		let li = document.append_element(list, "LI").unwrap();
		document.append_text(li, item).unwrap();
	}
	let before = document.to_html(body);

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let keywords = keywords(&[("Rust", 1), ("WebAssembly", 2)]);
	let stats = highlighter.highlight(&mut document, &body, &keywords);
	assert_eq!(stats.markers, 5);
	assert_ne!(document.to_html(body), before);

	assert_eq!(highlighter.clear_highlight(&mut document, &body), 5);
	assert_eq!(document.to_html(body), before);
	assert!(highlighter.patterns().is_empty());

	// And it can all be done again.
	assert_eq!(highlighter.highlight(&mut document, &body, &keywords).markers, 5);
	assert_eq!(highlighter.clear_highlight(&mut document, &body), 5);
	assert_eq!(document.to_html(body), before);
	assert_eq!(highlighter.clear_highlight(&mut document, &body), 0);
}

#[test]
fn empty_keywords_change_nothing() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	paragraph(&mut document, "some text");
	let mutations = document.mutation_count();

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let stats = highlighter.highlight(&mut document, &body, &KeywordSet::empty());
	assert_eq!(stats.text_nodes, 0);
	assert_eq!(document.mutation_count(), mutations);
}

#[test]
fn changed_keywords_are_applied_to_remaining_text() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	let p = paragraph(&mut document, "red green blue");

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	highlighter.highlight(&mut document, &body, &keywords(&[("red", 1)]));
	highlighter.highlight(&mut document, &body, &keywords(&[("red", 1), ("blue", 2)]));

	assert_eq!(
		document.to_html(p),
		format!("<p>{} green {}</p>", marker(1, "red"), marker(2, "blue"))
	);
}

#[test]
fn chunked_pass_yields_between_batches() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	for i in 0..120 {
		paragraph(&mut document, &format!("item {}", i));
	}

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let mut pass = highlighter.begin_pass(&document, &body, &keywords(&[("item", 1)]));
	assert_eq!(pass.remaining(), 120);

	assert_eq!(highlighter.advance(&mut document, &mut pass, 50), Progress::Yielded { remaining: 70 });
	assert_eq!(highlighter.advance(&mut document, &mut pass, 50), Progress::Yielded { remaining: 20 });
	match highlighter.advance(&mut document, &mut pass, 50) {
		Progress::Finished(stats) => {
			assert_eq!(stats.text_nodes, 120);
			assert_eq!(stats.markers, 120);
		}
		other => panic!("Expected a finished pass, got {:?}", other),
	}
}

#[test]
fn cancelled_pass_keeps_finished_work() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	for _ in 0..10 {
		paragraph(&mut document, "key");
	}

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let mut pass = highlighter.begin_pass(&document, &body, &keywords(&[("key", 1)]));
	assert_eq!(highlighter.advance(&mut document, &mut pass, 4), Progress::Yielded { remaining: 6 });

	pass.cancel_handle().cancel();
	match highlighter.advance(&mut document, &mut pass, 4) {
		Progress::Cancelled(stats) => assert_eq!(stats.markers, 4),
		other => panic!("Expected a cancelled pass, got {:?}", other),
	}
	assert_eq!(document.elements_with_class(&body, MARKER).len(), 4);
}

#[test]
fn markers_emptied_mid_pass_are_swept() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	paragraph(&mut document, "key");
	paragraph(&mut document, "key");

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let mut pass = highlighter.begin_pass(&document, &body, &keywords(&[("key", 1)]));
	assert_eq!(highlighter.advance(&mut document, &mut pass, 1), Progress::Yielded { remaining: 1 });

	let emptied = document.elements_with_class(&body, MARKER)[0];
	let content = document.first_child(&emptied).unwrap();
	document.set_text(content, " ").unwrap();

	match highlighter.advance(&mut document, &mut pass, 1) {
		Progress::Finished(stats) => {
			assert_eq!(stats.markers, 2);
			assert_eq!(stats.swept, 1);
		}
		other => panic!("Expected a finished pass, got {:?}", other),
	}
	assert!(!document.is_alive(emptied));
	assert_eq!(document.elements_with_class(&body, MARKER).len(), 1);
}

#[test]
fn nodes_removed_mid_pass_are_skipped() {
	init_logging();
	let mut document = Document::new();
	let body = document.body().unwrap();
	let first = paragraph(&mut document, "key one");
	let second = paragraph(&mut document, "key two");

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	let mut pass = highlighter.begin_pass(&document, &body, &keywords(&[("key", 1)]));
	document.remove(&first).unwrap();

	match highlighter.advance(&mut document, &mut pass, 10) {
		Progress::Finished(stats) => {
			assert_eq!(stats.failed, 1);
			assert_eq!(stats.markers, 1);
		}
		other => panic!("Expected a finished pass, got {:?}", other),
	}
	assert_eq!(document.to_html(second), format!("<p>{} two</p>", marker(1, "key")));
}

#[test]
fn match_hook_sees_every_marker() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	paragraph(&mut document, "cat dog cat");
	paragraph(&mut document, "dog");

	let seen = Rc::new(RefCell::new(Vec::new()));
	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	{
		let seen = Rc::clone(&seen);
		highlighter.set_match_hook(move |found| seen.borrow_mut().push((found.matched_text.clone(), found.keyword.color)));
	}
	highlighter.highlight(&mut document, &body, &keywords(&[("cat", 1), ("dog", 2)]));

	assert_eq!(
		*seen.borrow(),
		[
			("cat".to_owned(), 1),
			("dog".to_owned(), 2),
			("cat".to_owned(), 1),
			("dog".to_owned(), 2),
		]
	);
}

#[test]
fn node_states_expire_with_their_nodes() {
	let mut document = Document::new();
	let body = document.body().unwrap();
	let p = paragraph(&mut document, "nothing to highlight");
	let text = document.first_child(&p).unwrap();

	let mut highlighter = Highlighter::new(&document, HighlightConfig::default());
	highlighter.highlight(&mut document, &body, &keywords(&[("key", 1)]));
	assert!(highlighter.states().get(&text).is_some());

	document.remove(&p).unwrap();
	assert_eq!(highlighter.states().get(&text), None);

	let mut states = document.new_states();
	let other = paragraph(&mut document, "x");
	states.set(&other, 1);
	assert_eq!(states.get(&other), Some(1));
	document.remove(&other).unwrap();
	assert_eq!(states.get(&other), None);
	assert_eq!(states.len(), 1);
	assert_eq!(states.prune(), 1);
	assert!(states.is_empty());
}

#[test]
fn freed_ids_stay_dead_when_slots_are_reused() {
	let mut document = Document::new();
	let old = paragraph(&mut document, "old");
	document.remove(&old).unwrap();
	assert!(!document.is_alive(old));

	let new = paragraph(&mut document, "new");
	assert!(document.is_alive(new));
	assert_ne!(old, new);
	assert!(!document.is_connected(&old));
	assert_eq!(document.text_content(&old), "");
}
