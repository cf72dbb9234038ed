#![doc(html_root_url = "https://docs.rs/highlight-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! Keyword-category highlighting for live DOM trees.
//!
//! A [`Highlighter`] finds every non-overlapping occurrence of a [`KeywordSet`] in the eligible text nodes below a
//! root, wraps each one in a marker element carrying the category's color class, and reverses that cleanly with
//! [`Highlighter::clear_highlight`].
//! A [`ChangeObserver`] keeps the highlights in sync with mutations, navigation, keyword edits and the enabled flag,
//! in batches small enough to run once per animation frame.
//!
//! The engine works on any [`Dom`](`dom::Dom`): the browser's through [`web-sys`](https://docs.rs/web-sys) on
//! `wasm32`, or the in-memory [`dom::tree::Document`].

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod config;
pub mod dom;
mod error;
pub mod filter;
mod highlighter;
pub mod keyword;
pub mod matcher;
pub mod observer;
pub mod pattern;
pub mod schedule;
pub mod ttl_cache;

pub use config::HighlightConfig;
pub use error::{ConfigError, DomError};
pub use highlighter::{CancelHandle, Highlighter, Pass, PassStats, Progress};
pub use keyword::{Keyword, KeywordSet};
pub use observer::{ChangeObserver, Mutation};
