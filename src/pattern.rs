//! Compiled keyword patterns, memoized per keyword and [`MatchFlags`].

use crate::config::MatchFlags;
use core::num::NonZeroUsize;
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use regex_syntax::is_word_character;
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PatternKey {
	keyword: String,
	flags: MatchFlags,
}

/// A strict LRU cache of compiled keyword patterns.
///
/// Keywords are always literal: regex metacharacters are escaped before compiling.
/// A change of [`MatchFlags`] yields different keys, so stale entries simply age out.
#[derive(Debug)]
pub struct PatternCache {
	patterns: LruCache<PatternKey, Regex>,
	misses: u64,
}

impl PatternCache {
	/// A capacity of zero is treated as one.
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			patterns: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
			misses: 0,
		}
	}

	/// The compiled pattern for `keyword`, which becomes the most recently used entry.
	///
	/// On a miss, the least recently used entry is evicted first if the cache is full.
	/// Returns [`None`] only if the pattern exceeds the regex engine's size limits.
	pub fn get(&mut self, keyword: &str, flags: MatchFlags) -> Option<Regex> {
		let key = PatternKey { keyword: keyword.to_owned(), flags };
		if let Some(pattern) = self.patterns.get(&key) {
			return Some(pattern.clone());
		}

		self.misses += 1;
		let pattern = match compile(keyword, flags) {
			Ok(pattern) => pattern,
			Err(error) => {
				warn!("Failed to compile the pattern of a {}-byte keyword: {}", keyword.len(), error);
				return None;
			}
		};
		if let Some((evicted, _)) = self.patterns.push(key, pattern.clone()) {
			trace!("Evicted the pattern of a {}-byte keyword.", evicted.keyword.len());
		}
		Some(pattern)
	}

	/// Whether a pattern is cached, without promoting it.
	#[must_use]
	pub fn contains(&self, keyword: &str, flags: MatchFlags) -> bool {
		self.patterns.contains(&PatternKey { keyword: keyword.to_owned(), flags })
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.patterns.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.patterns.is_empty()
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.patterns.cap().get()
	}

	/// Number of compilations so far.
	#[must_use]
	pub fn misses(&self) -> u64 {
		self.misses
	}

	pub fn clear(&mut self) {
		self.patterns.clear();
	}
}

fn compile(keyword: &str, flags: MatchFlags) -> Result<Regex, regex::Error> {
	let mut pattern = String::with_capacity(keyword.len() * 2 + 6);
	let word_start = flags.whole_word && keyword.chars().next().map_or(false, is_word_character);
	let word_end = flags.whole_word && keyword.chars().next_back().map_or(false, is_word_character);

	if word_start {
		pattern.push_str(r"\b");
	}
	if flags.fold_diacritics {
		for c in keyword.chars() {
			push_folded(c, &mut pattern);
		}
	} else {
		pattern.push_str(&regex::escape(keyword));
	}
	if word_end {
		pattern.push_str(r"\b");
	}

	RegexBuilder::new(&pattern).case_insensitive(!flags.case_sensitive).build()
}

/// Latin base letters and the accented letters that fold onto them.
const FOLDS: &[(char, &str)] = &[
	('a', "àáâãäåāăą"),
	('c', "çćĉċč"),
	('d', "ďđ"),
	('e', "èéêëēĕėęě"),
	('g', "ĝğġģ"),
	('h', "ĥħ"),
	('i', "ìíîïĩīĭį"),
	('j', "ĵ"),
	('k', "ķ"),
	('l', "ĺļľŀł"),
	('n', "ñńņň"),
	('o', "òóôõöøōŏő"),
	('r', "ŕŗř"),
	('s', "śŝşš"),
	('t', "ţťŧ"),
	('u', "ùúûüũūŭůűų"),
	('w', "ŵ"),
	('y', "ýÿŷ"),
	('z', "źżž"),
];

/// Appends a character class matching `c`, its base letter and all accented variants of that base, in `c`'s case.
fn push_folded(c: char, pattern: &mut String) {
	let upper = c.is_uppercase();
	let lower = c.to_lowercase().next().unwrap_or(c);
	let fold = FOLDS.iter().find(|(base, variants)| *base == lower || variants.contains(lower));
	let (base, variants) = match fold {
		Some(&(base, variants)) => (base, variants),
		None => {
			let mut buffer = [0; 4];
			pattern.push_str(&regex::escape(c.encode_utf8(&mut buffer)));
			return;
		}
	};

	pattern.push('[');
	if upper {
		pattern.extend(base.to_uppercase());
		pattern.extend(variants.chars().flat_map(char::to_uppercase));
	} else {
		pattern.push(base);
		pattern.push_str(variants);
	}
	pattern.push(']');
}
