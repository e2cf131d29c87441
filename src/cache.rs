//! Style-profile cache — time- and size-bounded memoization of the
//! expensive style-directive build.
//!
//! The style directive is produced by an external generation backend,
//! so a turn whose affect state is *close enough* to a previous turn
//! should reuse the previous directive. "Close enough" is decided by
//! quantizing every continuous input before hashing: axis hints snap
//! to a 0.25 grid, the full phase-weight distribution is bucketed (no
//! top-K truncation, so a reversal between two close phases always
//! changes the key), and intensity is rounded to two decimals.
//!
//! Accepted limitations, by design rather than accident:
//!
//! - The cache is process-local and carries no persistence. A restart
//!   clears it; the next turn simply rebuilds. This is a staleness
//!   source the surrounding system accepts.
//! - Two threads racing to fill the same miss will both invoke the
//!   builder; the last write wins. The lock is released around the
//!   builder call on purpose — a builder can block for seconds and
//!   must not stall unrelated keys.
//! - The builder has no timeout and no cancellation; callers enforce
//!   their own deadlines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::debug;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::axes::{EmotionAxes, RelationAxes};

// ============================================================================
// Clock
// ============================================================================

/// Time source for entry ages, injectable so tests control TTL exactly.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock time since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        Duration::from_millis(Utc::now().timestamp_millis().max(0) as u64)
    }
}

/// A clock that only moves when told to. Test harness.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

// ============================================================================
// Quantization and fingerprints
// ============================================================================

/// Snap one axis value to the nearest multiple of `step` after
/// clamping into `[-1.0, 1.0]`.
pub fn quantize_axis(value: f64, step: f64) -> f64 {
    let v = if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    round4((v / step).round() * step)
}

/// Bucket a full phase-weight distribution into a stable signature.
///
/// Names come out in lexicographic order. With `scale_by_count`, each
/// weight is multiplied by the phase count before bucketing, so the
/// same *relative* dominance pattern hashes identically regardless of
/// how many phases the persona defines.
pub fn quantize_phase_signature(
    weights: &std::collections::BTreeMap<String, f64>,
    step: f64,
    scale_by_count: bool,
) -> Vec<(String, f64)> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }

    weights
        .iter()
        .map(|(name, w)| {
            let w = if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 };
            let x = if scale_by_count { w * n as f64 } else { w };
            (name.clone(), round4((x / step).round() * step))
        })
        .collect()
}

// Keys compare as strings after serialization; four decimals kill
// float representation jitter without merging distinct buckets.
fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// The inputs that identify one style directive.
#[derive(Debug, Clone, Copy)]
pub struct StyleProfileKey<'a> {
    /// Persona identity.
    pub persona: &'a str,
    /// Current phase-weight distribution.
    pub phase_weights: &'a std::collections::BTreeMap<String, f64>,
    /// Relation stance toward the conversation partner, if any.
    pub relation_hint: Option<&'a RelationAxes>,
    /// Current emotional state, if any.
    pub emotion_hint: Option<&'a EmotionAxes>,
    /// Style intensity in `[0.0, 1.0]`.
    pub intensity: f64,
}

#[derive(Serialize)]
struct KeyPayload<'a> {
    persona: &'a str,
    phase: Vec<(String, f64)>,
    rel: Vec<(&'static str, f64)>,
    emo: Vec<(&'static str, f64)>,
    int: f64,
}

impl StyleProfileKey<'_> {
    /// Serialize the quantized key material canonically and hash it to
    /// a fixed-length hex fingerprint.
    ///
    /// The fused description text deliberately stays out of the key:
    /// string jitter there would defeat the quantization.
    pub fn fingerprint(&self, config: &CacheConfig) -> String {
        let rel: Vec<(&'static str, f64)> = self
            .relation_hint
            .map(|axes| {
                axes.entries()
                    .into_iter()
                    .map(|(name, v)| (name, quantize_axis(v, config.axis_step)))
                    .collect()
            })
            .unwrap_or_default();
        let emo: Vec<(&'static str, f64)> = self
            .emotion_hint
            .map(|axes| {
                axes.entries()
                    .into_iter()
                    .map(|(name, v)| (name, quantize_axis(v, config.axis_step)))
                    .collect()
            })
            .unwrap_or_default();

        let payload = KeyPayload {
            persona: self.persona,
            phase: quantize_phase_signature(
                self.phase_weights,
                config.phase_step,
                config.scale_phase_weights,
            ),
            rel,
            emo,
            int: (self.intensity * 100.0).round() / 100.0,
        };

        let raw = serde_json::to_vec(&payload).expect("key payload is always serializable");
        hex::encode(Sha256::digest(&raw))
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Tuning knobs for [`StyleProfileCache`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Maximum entry age before it counts as a miss.
    pub ttl: Duration,
    /// Entry budget enforced by the size sweep.
    pub max_entries: usize,
    /// Quantization step for relation/emotion hints.
    pub axis_step: f64,
    /// Quantization step for the phase-weight signature.
    pub phase_step: f64,
    /// Rescale phase weights by the phase count before bucketing.
    pub scale_phase_weights: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 256,
            axis_step: 0.25,
            phase_step: 0.25,
            scale_phase_weights: true,
        }
    }
}

/// One memoized style directive.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The built directive text.
    pub value: String,
    /// Clock reading at insertion.
    pub created_at: Duration,
}

/// In-process, bounded memoization of style directives.
///
/// An explicit object rather than process-global state: callers own
/// the instance, inject the clock, and may run several caches side by
/// side.
pub struct StyleProfileCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StyleProfileCache {
    /// Cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Cache on an injected clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fingerprint key material using this cache's quantization steps.
    pub fn fingerprint(&self, key: &StyleProfileKey<'_>) -> String {
        key.fingerprint(&self.config)
    }

    /// Return the cached directive for `key`, or invoke `builder`,
    /// store its output, and return it.
    ///
    /// A builder error propagates to the caller and nothing is cached
    /// for the key, so a transient backend failure cannot poison
    /// later turns.
    pub fn get_or_build<F>(&self, key: &str, builder: F) -> anyhow::Result<String>
    where
        F: FnOnce() -> anyhow::Result<String>,
    {
        if let Some(value) = self.get(key) {
            let hits = self.hits.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                "style profile hit key={} hits={} misses={}",
                short(key),
                hits,
                self.misses.load(Ordering::Relaxed)
            );
            return Ok(value);
        }

        let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "style profile miss key={} hits={} misses={}",
            short(key),
            self.hits.load(Ordering::Relaxed),
            misses
        );

        // Lock intentionally not held across the builder call; see the
        // module docs for the duplicate-build consequence.
        let value = builder()?;
        self.put(key, value.clone());
        Ok(value)
    }

    /// TTL-checked lookup. An expired entry is evicted immediately and
    /// reported as a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if age(now, entry.created_at) <= self.config.ttl => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a directive and run the eviction sweep.
    pub fn put(&self, key: &str, value: String) {
        let created_at = self.clock.now();
        {
            let mut entries = self.entries.lock();
            entries.insert(key.to_string(), CacheEntry { value, created_at });
        }
        self.gc();
    }

    /// Two-phase sweep: drop everything past the TTL first; only when
    /// that removed nothing, evict oldest-by-creation entries until
    /// the size budget holds. Returns the number of entries removed.
    pub fn gc(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let before = entries.len();
        entries.retain(|_, entry| age(now, entry.created_at) <= self.config.ttl);
        let mut removed = before - entries.len();

        if removed == 0 && entries.len() > self.config.max_entries {
            let mut by_age: Vec<(String, Duration)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.created_at))
                .collect();
            by_age.sort_by_key(|(_, created_at)| *created_at);

            let over = entries.len() - self.config.max_entries;
            for (key, _) in by_age.into_iter().take(over) {
                entries.remove(&key);
                removed += 1;
            }
        }

        removed
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn age(now: Duration, created_at: Duration) -> Duration {
    now.checked_sub(created_at).unwrap_or_default()
}

fn short(key: &str) -> &str {
    &key[..key.len().min(8)]
}

// ============================================================================
// Tests
// ============================================================================
