//! Finding the keyword occurrences to highlight in one string.

use crate::{config::MatchFlags, keyword::Keyword, pattern::PatternCache};
use aho_corasick::AhoCorasick;
use core::cmp::Reverse;
use std::borrow::Cow;
use tracing::{trace, warn};

/// One accepted keyword occurrence. Offsets are byte offsets into the searched text, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<'k> {
	pub start: usize,
	pub end: usize,
	pub matched_text: String,
	pub keyword: &'k Keyword,
}

/// Selects the maximal set of non-overlapping keyword occurrences in a text, longest keyword first.
pub struct MatchFinder<'c> {
	patterns: &'c mut PatternCache,
	flags: MatchFlags,
}

impl<'c> MatchFinder<'c> {
	pub fn new(patterns: &'c mut PatternCache, flags: MatchFlags) -> Self {
		Self { patterns, flags }
	}

	/// Finds the occurrences of `keywords` in `text` that get highlighted, sorted by position.
	///
	/// Keywords claim text in order of descending length (in characters), ties broken by their order in `keywords`,
	/// so a keyword is never fragmented by a shorter one contained in it.
	/// An occurrence is accepted iff it doesn't overlap any previously accepted one.
	///
	/// The result is a pure function of the arguments and the flags.
	pub fn find_matches<'k>(&mut self, text: &str, keywords: &'k [Keyword]) -> Vec<Match<'k>> {
		if text.is_empty() || keywords.is_empty() {
			return Vec::new();
		}
		let text_chars = text.chars().count();

		let mut order: Vec<(usize, &Keyword)> = keywords.iter().map(|keyword| (keyword.text.chars().count(), keyword)).collect();
		order.sort_by_key(|&(length, _)| Reverse(length));

		// Sorted by `start`. Since they never overlap, also sorted by `end`.
		let mut accepted: Vec<Match<'k>> = Vec::new();
		for (length, keyword) in order {
			if length == 0 || length > text_chars {
				continue;
			}
			let pattern = match self.patterns.get(&keyword.text, self.flags) {
				Some(pattern) => pattern,
				None => continue,
			};

			let mut position = 0;
			while let Some(found) = pattern.find_at(text, position) {
				let (start, end) = (found.start(), found.end());
				if end == start {
					position = next_char_boundary(text, start);
					continue;
				}

				let exact_case = !self.flags.case_sensitive || self.flags.fold_diacritics || found.as_str() == keyword.text;
				let slot = accepted.partition_point(|other| other.end <= start);
				let overlaps = accepted.get(slot).map_or(false, |other| other.start < end);

				if exact_case && !overlaps {
					accepted.insert(
						slot,
						Match {
							start,
							end,
							matched_text: found.as_str().to_owned(),
							keyword,
						},
					);
					position = end;
				} else {
					// A later, partially overlapping occurrence of the same keyword may still fit.
					position = next_char_boundary(text, start);
				}
				if position >= text.len() {
					break;
				}
			}
		}

		trace!("Accepted {} match(es) in {} byte(s) of text.", accepted.len(), text.len());
		accepted
	}
}

fn next_char_boundary(text: &str, index: usize) -> usize {
	text[index..].chars().next().map_or(text.len(), |c| index + c.len_utf8())
}

/// Cheap test whether any keyword could possibly occur in a text, run before the full [`MatchFinder`].
///
/// A negative answer is final. Matching is literal, ASCII case-insensitive when case-insensitive.
/// Case-insensitive keywords outside of ASCII disable the prefilter, since their case folding is too broad for it.
#[derive(Debug)]
pub struct Prefilter {
	automaton: Option<AhoCorasick>,
	fold_case: bool,
}

impl Prefilter {
	pub fn new(keywords: &[Keyword], flags: MatchFlags) -> Self {
		let fold_case = !flags.case_sensitive;
		// Folded keywords have no literal form to search for.
		if flags.fold_diacritics || keywords.is_empty() || (fold_case && keywords.iter().any(|keyword| !keyword.text.is_ascii())) {
			return Self {
				automaton: None,
				fold_case,
			};
		}
		let needles = keywords.iter().map(|keyword| keyword.text.as_str());
		let automaton = match AhoCorasick::builder().ascii_case_insensitive(fold_case).build(needles) {
			Ok(automaton) => Some(automaton),
			Err(error) => {
				warn!("Failed to build the keyword prefilter, checking every text node: {}", error);
				None
			}
		};
		Self { automaton, fold_case }
	}

	#[must_use]
	pub fn might_match(&self, text: &str) -> bool {
		match &self.automaton {
			None => true,
			Some(automaton) if self.fold_case => automaton.is_match(&*fold_ascii_lookalikes(text)),
			Some(automaton) => automaton.is_match(text),
		}
	}
}

/// Replaces the non-ASCII characters that case-fold to ASCII letters (long s and the Kelvin sign) with those letters.
fn fold_ascii_lookalikes(text: &str) -> Cow<'_, str> {
	if !text.contains(|c: char| c == '\u{17F}' || c == '\u{212A}') {
		return Cow::Borrowed(text);
	}
	Cow::Owned(
		text.chars()
			.map(|c| match c {
				'\u{17F}' => 's',
				'\u{212A}' => 'k',
				c => c,
			})
			.collect(),
	)
}
