//! A bounded key-value cache with two expiry clocks, for state values read through from storage.

use crate::config::CacheConfig;
use core::{
	cell::Cell,
	hash::Hash,
	time::Duration,
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::trace;

/// Milliseconds on some monotonic-enough timeline.
pub trait Clock {
	fn now_ms(&self) -> u64;
}

/// Wall clock time: `Date.now()` in the browser, [`std::time::SystemTime`] elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	#[cfg(target_arch = "wasm32")]
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn now_ms(&self) -> u64 {
		js_sys::Date::now() as u64
	}

	#[cfg(not(target_arch = "wasm32"))]
	#[allow(clippy::cast_possible_truncation)]
	fn now_ms(&self) -> u64 {
		std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map_or(0, |since_epoch| since_epoch.as_millis() as u64)
	}
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
	#[must_use]
	pub fn new(now_ms: u64) -> Self {
		Self(Rc::new(Cell::new(now_ms)))
	}

	pub fn advance(&self, by: Duration) {
		self.0.set(self.0.get() + duration_ms(by));
	}

	pub fn set(&self, now_ms: u64) {
		self.0.set(now_ms)
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> u64 {
		self.0.get()
	}
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
	duration.as_millis() as u64
}

#[derive(Debug)]
struct Entry<V> {
	value: V,
	created_ms: u64,
	accessed_ms: u64,
}

/// A plain bounded cache, not a store: callers keep the source of truth.
///
/// Entries expire [`max_age`](`CacheConfig::max_age`) after insertion, checked on every read and sweep, and
/// [`ttl`](`CacheConfig::ttl`) after their last read, checked on sweeps only. Whichever is stricter wins.
/// Sweeps are driven by the host through [`sweep_if_due`](`TtlCache::sweep_if_due`) on its own timer.
#[derive(Debug)]
pub struct TtlCache<K, V, C = SystemClock> {
	entries: HashMap<K, Entry<V>>,
	config: CacheConfig,
	clock: C,
	last_sweep_ms: u64,
}

impl<K: Hash + Eq + Clone, V> TtlCache<K, V, SystemClock> {
	#[must_use]
	pub fn new(config: CacheConfig) -> Self {
		Self::with_clock(config, SystemClock)
	}
}

impl<K: Hash + Eq + Clone, V, C: Clock> TtlCache<K, V, C> {
	pub fn with_clock(config: CacheConfig, clock: C) -> Self {
		Self {
			entries: HashMap::new(),
			last_sweep_ms: clock.now_ms(),
			config,
			clock,
		}
	}

	/// Inserts or replaces `key`. If the cache is full, the entry inserted longest ago is evicted first.
	///
	/// Replacing never evicts. A [`max_size`](`CacheConfig::max_size`) of zero holds one entry, the latest.
	pub fn set(&mut self, key: K, value: V) {
		if self.entries.len() >= self.config.max_size.max(1) && !self.entries.contains_key(&key) {
			let oldest = self.entries.iter().min_by_key(|(_, entry)| entry.created_ms).map(|(key, _)| key.clone());
			if let Some(oldest) = oldest {
				self.entries.remove(&oldest);
				trace!("Evicted the oldest cache entry to make room.");
			}
		}
		let now = self.clock.now_ms();
		self.entries.insert(
			key,
			Entry {
				value,
				created_ms: now,
				accessed_ms: now,
			},
		);
	}

	/// The value of `key` unless it exceeded its maximum age, in which case it is evicted.
	pub fn get(&mut self, key: &K) -> Option<&V> {
		let now = self.clock.now_ms();
		let max_age = duration_ms(self.config.max_age);
		let expired = now.saturating_sub(self.entries.get(key)?.created_ms) > max_age;
		if expired {
			self.entries.remove(key);
			return None;
		}
		let entry = self.entries.get_mut(key)?;
		entry.accessed_ms = now;
		Some(&entry.value)
	}

	/// Evicts every entry past its maximum age or idle beyond its TTL. Returns how many were evicted.
	pub fn sweep(&mut self) -> usize {
		let now = self.clock.now_ms();
		let (max_age, ttl) = (duration_ms(self.config.max_age), duration_ms(self.config.ttl));
		let before = self.entries.len();
		self.entries
			.retain(|_, entry| now.saturating_sub(entry.created_ms) <= max_age && now.saturating_sub(entry.accessed_ms) <= ttl);
		self.last_sweep_ms = now;
		let evicted = before - self.entries.len();
		if evicted > 0 {
			trace!("Swept {} expired cache entries.", evicted);
		}
		evicted
	}

	/// Runs [`sweep`](`TtlCache::sweep`) if the cleanup interval has passed since the last one.
	pub fn sweep_if_due(&mut self) -> Option<usize> {
		let due = self.clock.now_ms().saturating_sub(self.last_sweep_ms) >= duration_ms(self.config.cleanup_interval);
		if due {
			Some(self.sweep())
		} else {
			None
		}
	}

	pub fn remove(&mut self, key: &K) -> Option<V> {
		self.entries.remove(key).map(|entry| entry.value)
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn config(&self) -> &CacheConfig {
		&self.config
	}
}
