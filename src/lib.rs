//! # persona-affect
//!
//! Affect-state engine for simulated personas. Across a multi-turn
//! conversation it maintains a numeric mood-and-relationship state,
//! converts that state into a weighted blend of authored behavioral
//! phases, and memoizes the expensive derived style directive.
//!
//! The per-turn flow:
//!
//! ```text
//! Delta (external analyzer)
//!   ↓  update_axes            — EMA over emotion + relation axes
//!   ↓  update_phase_weights   — soft-arg-max over phase evidence
//!   ↓  fuse_phase_config      — one blended FusedPhase descriptor
//!   ↓  StyleProfileCache      — quantized-fingerprint memoization
//! ```
//!
//! Everything upstream (turn analysis) and downstream (prompt
//! construction, text generation) is an external collaborator: the
//! analyzer hands in a [`Delta`], and the generation backend is just
//! the `builder` closure given to
//! [`cache::StyleProfileCache::get_or_build`].
//!
//! # Example
//!
//! ```
//! use persona_affect::{Delta, Engine, PersonaDefinition, PersonaState};
//!
//! let persona = PersonaDefinition::from_json(r#"{
//!     "persona_name": "warlord",
//!     "phases": {
//!         "calm":  {"emotion_bias": {"anger": -1.0}},
//!         "wrath": {"emotion_bias": {"anger": 1.0}}
//!     }
//! }"#).unwrap();
//!
//! let mut engine = Engine::new();
//! let prior = PersonaState::initial();
//! let delta = Delta::from_json(r#"{"emotion_axes": {"anger": 0.8}}"#);
//!
//! let (state, fused) = engine.process_turn(&persona, &prior, &delta);
//! assert_eq!(state.phase_weights.len(), 2);
//! assert!(fused.emotion_bias.anger != 0.0);
//! ```

pub mod axes;
pub mod cache;
pub mod delta;
pub mod engine;
pub mod error;
pub mod expression;
pub mod phase;
pub mod state;
pub mod store;

// Re-exports
pub use axes::{
    EmotionAxes, EmotionBias, RelationAxes, RelationBias, EMOTION_AXIS_NAMES, RELATION_AXIS_NAMES,
};
pub use cache::{
    CacheConfig, CacheEntry, Clock, ManualClock, StyleProfileCache, StyleProfileKey, SystemClock,
};
pub use delta::{AxisChange, Delta, EmotionDelta, RelationDelta};
pub use engine::Engine;
pub use error::EngineError;
pub use expression::{ExpressionBank, ExpressionGroup};
pub use phase::{
    fuse_phase_config, normalize_stored_weights, select_active_phase, update_phase_weights,
    EngineParams, FusedPhase, NoNoise, NoiseSource, PersonaDefinition, Phase, PhaseCatalog,
    PhaseDynamics, PhaseWeightUpdate, ScriptedNoise, UniformNoise,
};
pub use state::{update_axes, PersonaState, RelationGraph, DEFAULT_ALPHA};
pub use store::PersonaStateStore;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
