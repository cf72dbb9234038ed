use crate::error::ConfigError;
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Settings of one [`Highlighter`](`crate::Highlighter`) instance.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HighlightConfig {
	/// Class carried by every marker. Stylesheets and the options UI rely on it.
	pub class_name: String,
	/// Prefix of the per-category class, followed by the color index.
	pub style_prefix: String,
	/// Tag name of created markers.
	pub marker_tag: String,
	pub case_sensitive: bool,
	/// Only accept occurrences bounded by non-word characters on both sides.
	pub whole_word: bool,
	/// Let unaccented letters in keywords match their accented variants in text.
	pub fold_diacritics: bool,
	/// Text nodes handled per cooperative batch.
	pub batch_size: usize,
	pub pattern_cache_capacity: usize,
	/// Quiet time after the last mutation before pending nodes are processed.
	pub mutation_debounce_ms: u64,
	/// Upper-case tag names whose contents are never highlighted.
	pub skip_tags: Vec<String>,
	/// Number of category colors in the stylesheet. Colors outside `1..=palette_size` render as `1`.
	pub palette_size: u32,
}

impl Default for HighlightConfig {
	fn default() -> Self {
		Self {
			class_name: "chrome-extension-mutihighlight".to_owned(),
			style_prefix: "chrome-extension-mutihighlight-style-".to_owned(),
			marker_tag: "SPAN".to_owned(),
			case_sensitive: true,
			whole_word: false,
			fold_diacritics: false,
			batch_size: 50,
			pattern_cache_capacity: 1000,
			mutation_debounce_ms: 10,
			skip_tags: ["SCRIPT", "STYLE", "NOSCRIPT", "INPUT", "TEXTAREA"].iter().map(|&tag| tag.to_owned()).collect(),
			palette_size: 20,
		}
	}
}

impl HighlightConfig {
	/// Parses a (possibly partial) JSON configuration object.
	///
	/// # Errors
	///
	/// Iff `json` is not a valid configuration object.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		Ok(serde_json::from_str(json)?)
	}

	/// The full `class` attribute value of a marker for `color`.
	#[must_use]
	pub fn marker_class(&self, color: u32) -> String {
		let color = if (1..=self.palette_size).contains(&color) { color } else { 1 };
		format!("{} {}{}", self.class_name, self.style_prefix, color)
	}

	#[must_use]
	pub fn is_skip_tag(&self, tag: &str) -> bool {
		self.skip_tags.iter().any(|skip| skip.eq_ignore_ascii_case(tag))
	}

	/// The flags a compiled pattern depends on.
	#[must_use]
	pub fn match_flags(&self) -> MatchFlags {
		MatchFlags {
			case_sensitive: self.case_sensitive,
			whole_word: self.whole_word,
			fold_diacritics: self.fold_diacritics,
		}
	}
}

/// The part of [`HighlightConfig`] that changes how a keyword is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchFlags {
	pub case_sensitive: bool,
	pub whole_word: bool,
	pub fold_diacritics: bool,
}

impl Default for MatchFlags {
	fn default() -> Self {
		HighlightConfig::default().match_flags()
	}
}

/// Limits of a [`TtlCache`](`crate::ttl_cache::TtlCache`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
	/// Idle time since the last access after which a sweep evicts an entry.
	pub ttl: Duration,
	/// Absolute lifetime since insertion.
	pub max_age: Duration,
	pub max_size: usize,
	pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			ttl: Duration::from_secs(5 * 60),
			max_age: Duration::from_secs(30 * 60),
			max_size: 1000,
			cleanup_interval: Duration::from_secs(2 * 60),
		}
	}
}
