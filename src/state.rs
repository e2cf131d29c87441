//! Per-persona affect state and the exponential-moving-average update.
//!
//! [`PersonaState`] is the only mutable record this engine owns: one
//! emotion vector, a lazily growing relation graph, and the current
//! phase-weight distribution. It is created zero-initialized on a
//! persona's first turn, mutated exactly once per turn, and persisted
//! by the caller (or by [`crate::store::PersonaStateStore`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::axes::{EmotionAxes, RelationAxes};
use crate::delta::Delta;

/// Relationship targets by name, each with its own 6-axis stance.
///
/// Grows lazily: a target springs into existence with the zero vector
/// the first time a delta mentions it. Nothing in the engine ever
/// removes a target.
pub type RelationGraph = BTreeMap<String, RelationAxes>;

/// Default smoothing constant for the EMA update.
pub const DEFAULT_ALPHA: f64 = 0.3;

// ============================================================================
// PersonaState
// ============================================================================

/// The complete evolving state of one persona.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaState {
    /// The persona's own 8-axis emotional state.
    #[serde(default)]
    pub emotion_axes: EmotionAxes,

    /// Stance toward each known relationship target.
    #[serde(default)]
    pub relations: RelationGraph,

    /// Probability distribution over the persona's phases. Sums to 1
    /// once the scheduler has run; empty before the first turn or when
    /// the persona defines no phases.
    #[serde(default)]
    pub phase_weights: BTreeMap<String, f64>,

    /// Arg-max of `phase_weights`, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_phase: Option<String>,
}

impl PersonaState {
    /// Fresh state for a persona's first turn: all axes zero, with the
    /// conversation partner already present in the relation graph.
    pub fn initial() -> Self {
        let mut relations = RelationGraph::new();
        relations.insert("user".to_string(), RelationAxes::zero());
        Self {
            relations,
            ..Self::default()
        }
    }
}

// ============================================================================
// EMA update
// ============================================================================

/// Blend the prior state with one turn's delta.
///
/// For every emotion axis: `new = clamp((1-alpha)*old + alpha*delta)`.
/// An axis the delta does not mention contributes a change of 0.0, so
/// emotion always decays toward neutral on a quiet turn. A malformed
/// component skips the axis entirely, retaining the old value.
///
/// Relations are asymmetric with emotion on purpose: only targets the
/// delta mentions are updated (new targets start from the zero
/// vector); every other target carries over exactly, with no decay.
///
/// Phase weights and the dominant phase pass through unchanged — the
/// scheduler owns those.
pub fn update_axes(old: &PersonaState, delta: &Delta, alpha: f64) -> PersonaState {
    let mut new = old.clone();

    let old_emotion = old.emotion_axes.entries();
    for ((axis, old_val), change) in old_emotion.into_iter().zip(delta.emotion_axes.changes()) {
        if let Some(d) = change.applied() {
            new.emotion_axes.set(axis, (1.0 - alpha) * old_val + alpha * d);
        }
    }

    for (target, target_delta) in &delta.relations {
        let axes = new
            .relations
            .entry(target.clone())
            .or_insert_with(RelationAxes::zero);
        let old_values = axes.entries();
        for ((axis, old_val), change) in old_values.into_iter().zip(target_delta.changes()) {
            if let Some(d) = change.applied() {
                axes.set(axis, (1.0 - alpha) * old_val + alpha * d);
            }
        }
    }

    new
}

// ============================================================================
// Tests
// ============================================================================
