//! The canonical keyword shape and the snapshots handed to a highlighting pass.
//!
//! Whatever the storage layer delivers is normalized here, before any matching logic runs.

use crate::error::ConfigError;
use core::{
	convert::TryFrom,
	hash::{Hash, Hasher},
	ops::Deref,
};
use hashbrown::{hash_map::Entry, HashMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::hash_map::DefaultHasher, rc::Rc};
use tracing::{debug, trace};

/// One literal string to search for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
	/// Non-empty and trimmed once part of a [`KeywordSet`].
	pub text: String,
	/// Palette index of the category, `1..=palette_size`.
	pub color: u32,
	/// Stable ordering key of the category.
	pub category_index: usize,
}

impl Keyword {
	pub fn new(text: impl Into<String>, color: u32, category_index: usize) -> Self {
		Self { text: text.into(), color, category_index }
	}
}

/// A keyword entry as stored by the extension.
///
/// Fields are loosely typed. Entries with a missing, empty or non-string text are dropped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawKeyword {
	#[serde(alias = "words")]
	pub text: Option<Value>,
	#[serde(alias = "colour")]
	pub color: Option<Value>,
	#[serde(rename = "categoryIndex", alias = "category_index")]
	pub category_index: Option<usize>,
}

impl RawKeyword {
	fn normalize(self, position: usize) -> Option<Keyword> {
		let text = match self.text {
			Some(Value::String(text)) => text,
			_ => return None,
		};
		let color = match self.color {
			Some(Value::Number(number)) => number.as_u64().and_then(|color| u32::try_from(color).ok()),
			Some(Value::String(string)) => string.trim().parse().ok(),
			_ => None,
		}
		.unwrap_or(1);
		Some(Keyword::new(text, color, self.category_index.unwrap_or(position)))
	}
}

/// A named, colored keyword group as edited in the options UI.
///
/// `data` holds the whitespace-separated keywords. Only categories with `status == 1` are enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
	pub name: String,
	pub colour: u32,
	pub data: String,
	pub status: u8,
}

/// An immutable snapshot of the active keywords.
///
/// Cloning is cheap. The snapshot is never modified after construction; a changed keyword list is a new `KeywordSet`
/// with a different [`fingerprint`](`KeywordSet::fingerprint`).
#[derive(Debug, Clone)]
pub struct KeywordSet {
	keywords: Rc<[Keyword]>,
	fingerprint: u64,
}

impl KeywordSet {
	/// Normalizes `keywords` into a snapshot.
	///
	/// Texts are trimmed and empty ones dropped.
	/// A text that occurs more than once keeps the color and category of its *last* occurrence.
	/// The result is ordered by category index, preserving input order within a category.
	pub fn new(keywords: impl IntoIterator<Item = Keyword>) -> Self {
		let mut unique = Vec::<Keyword>::new();
		let mut positions = HashMap::<String, usize>::new();
		let mut dropped = 0_usize;
		for mut keyword in keywords {
			let trimmed = keyword.text.trim();
			if trimmed.is_empty() {
				dropped += 1;
				continue;
			}
			if trimmed.len() != keyword.text.len() {
				keyword.text = trimmed.to_owned();
			}
			match positions.entry(keyword.text.clone()) {
				Entry::Occupied(occupied) => unique[*occupied.get()] = keyword,
				Entry::Vacant(vacant) => {
					vacant.insert(unique.len());
					unique.push(keyword);
				}
			}
		}
		unique.sort_by_key(|keyword| keyword.category_index);

		if dropped > 0 {
			debug!("Dropped {} empty keyword(s).", dropped);
		}

		let mut hasher = DefaultHasher::new();
		unique.hash(&mut hasher);
		Self {
			fingerprint: hasher.finish(),
			keywords: unique.into(),
		}
	}

	#[must_use]
	pub fn empty() -> Self {
		Self::new(Vec::new())
	}

	/// Normalizes entries in the storage layer's format, see [`RawKeyword`].
	pub fn from_raw(raw: impl IntoIterator<Item = RawKeyword>) -> Self {
		let mut rejected = 0_usize;
		let set = Self::new(raw.into_iter().enumerate().filter_map(|(position, raw)| {
			let keyword = raw.normalize(position);
			if keyword.is_none() {
				rejected += 1;
			}
			keyword
		}));
		if rejected > 0 {
			trace!("Rejected {} keyword entries without string text.", rejected);
		}
		set
	}

	/// Parses a JSON array of [`RawKeyword`]s.
	///
	/// # Errors
	///
	/// Iff `json` is not an array of objects. Malformed individual entries are dropped instead.
	pub fn from_json(json: &str) -> Result<Self, ConfigError> {
		let raw: Vec<RawKeyword> = serde_json::from_str(json)?;
		Ok(Self::from_raw(raw))
	}

	/// Flattens the enabled categories into one snapshot, keyed by category position.
	#[must_use]
	pub fn from_categories(categories: &[Category]) -> Self {
		Self::new(
			categories
				.iter()
				.enumerate()
				.filter(|(_, category)| category.status == 1)
				.flat_map(|(index, category)| category.data.split_whitespace().map(move |word| Keyword::new(word, category.colour, index))),
		)
	}

	/// Identity of this snapshot's content. Equal for equal keyword lists.
	#[must_use]
	pub fn fingerprint(&self) -> u64 {
		self.fingerprint
	}

	#[must_use]
	pub fn as_slice(&self) -> &[Keyword] {
		&self.keywords
	}
}

impl Default for KeywordSet {
	fn default() -> Self {
		Self::empty()
	}
}

impl Deref for KeywordSet {
	type Target = [Keyword];

	fn deref(&self) -> &Self::Target {
		&self.keywords
	}
}

impl PartialEq for KeywordSet {
	fn eq(&self, other: &Self) -> bool {
		self.fingerprint == other.fingerprint && self.keywords == other.keywords
	}
}
impl Eq for KeywordSet {}

impl<'a> IntoIterator for &'a KeywordSet {
	type Item = &'a Keyword;
	type IntoIter = core::slice::Iter<'a, Keyword>;

	fn into_iter(self) -> Self::IntoIter {
		self.keywords.iter()
	}
}
