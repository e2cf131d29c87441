//! Phase catalog — the validated, read-only view of a persona's
//! authored behavioral modes.
//!
//! A persona definition is free-form JSON written by hand, so the
//! catalog is checked once at load time: every bias weight must be a
//! finite number in `[-1.0, 1.0]`. Configuration mistakes surface as a
//! single [`EngineError::Catalog`] at startup instead of corrupting
//! per-turn math.
//!
//! Catalogs iterate in lexicographic phase-name order. That order is
//! canonical: fusion output and scheduler tie-breaks both rely on it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::axes::{EmotionBias, RelationBias};
use crate::error::EngineError;
use crate::expression::ExpressionBank;

// ============================================================================
// Phase
// ============================================================================

/// One authored behavioral mode. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase name, unique within the catalog.
    #[serde(skip)]
    pub name: String,

    /// Human/LLM-readable description of the mode.
    #[serde(default)]
    pub description: String,

    /// Weights over the relation axes that attract this phase.
    #[serde(default)]
    pub style_bias: RelationBias,

    /// Weights over the emotion axes that attract this phase.
    #[serde(default)]
    pub emotion_bias: EmotionBias,

    /// Free-text tone directive for prompt construction.
    #[serde(default)]
    pub tone_hint: String,

    /// Keys into the persona's expression bank, in authored order.
    #[serde(default)]
    pub expression_refs: Vec<String>,
}

// ============================================================================
// PhaseCatalog
// ============================================================================

/// The full set of a persona's phases, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseCatalog {
    phases: Vec<Phase>,
}

impl PhaseCatalog {
    /// A catalog with no phases. Scheduler and fusion treat it as a
    /// no-op input.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a validated catalog from named phase definitions.
    pub fn new(phases: BTreeMap<String, Phase>) -> Result<Self, EngineError> {
        let mut out = Vec::with_capacity(phases.len());
        for (name, mut phase) in phases {
            phase.name = name;
            if let Err(detail) = phase.style_bias.validate() {
                return Err(EngineError::Catalog {
                    phase: phase.name,
                    detail: format!("style_bias: {}", detail),
                });
            }
            if let Err(detail) = phase.emotion_bias.validate() {
                return Err(EngineError::Catalog {
                    phase: phase.name,
                    detail: format!("emotion_bias: {}", detail),
                });
            }
            out.push(phase);
        }
        Ok(Self { phases: out })
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Phases in canonical (name-sorted) order.
    pub fn iter(&self) -> std::slice::Iter<'_, Phase> {
        self.phases.iter()
    }

    /// Look up a phase by name.
    pub fn get(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// The first phase in canonical order, if any.
    pub fn first(&self) -> Option<&Phase> {
        self.phases.first()
    }

    /// Phase names in canonical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|p| p.name.as_str())
    }
}

// ============================================================================
// Scheduler parameters and per-persona overrides
// ============================================================================

/// Resolved scheduler parameters for one persona.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    /// EMA smoothing constant, shared by the axis update and the
    /// relation contribution of the scheduler.
    pub alpha: f64,
    /// Scale of the emotion contribution.
    pub beta: f64,
    /// Half-width of the uniform perturbation added per phase per turn.
    pub gamma: f64,
    /// Softmax temperature for weight normalization.
    pub temperature: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.2,
            gamma: 0.05,
            temperature: 0.4,
        }
    }
}

/// Persona-authored overrides of [`EngineParams`].
///
/// Each field is independently optional. A non-numeric or non-finite
/// value is ignored in favor of the engine default — never an error, so
/// a typo in one field cannot take the persona down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseDynamics {
    #[serde(default, deserialize_with = "de_lenient_number")]
    pub alpha: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_number")]
    pub beta: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_number")]
    pub gamma: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_number")]
    pub temperature: Option<f64>,
}

impl PhaseDynamics {
    /// Apply the overrides on top of the given defaults, field by field.
    pub fn resolve(&self, defaults: &EngineParams) -> EngineParams {
        EngineParams {
            alpha: self.alpha.unwrap_or(defaults.alpha),
            beta: self.beta.unwrap_or(defaults.beta),
            gamma: self.gamma.unwrap_or(defaults.gamma),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        }
    }
}

fn de_lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|v| v.is_finite()))
}

// ============================================================================
// PersonaDefinition
// ============================================================================

/// The static, offline-authored definition of one persona, as far as
/// the engine cares: its phases, its scheduler overrides, and its
/// expression bank. Profile prose (values, backstory, vocabulary) is
/// produced and consumed elsewhere.
#[derive(Debug, Clone, Default)]
pub struct PersonaDefinition {
    /// Persona identity, used in cache fingerprints and state paths.
    pub name: String,
    /// Validated phase catalog.
    pub catalog: PhaseCatalog,
    /// Scheduler parameter overrides.
    pub dynamics: PhaseDynamics,
    /// Name of the phase to prefer when the state carries no usable
    /// weights, if the author designated one.
    pub default_phase: Option<String>,
    /// Reusable phrase material keyed by the phases' expression refs.
    pub expression_bank: Option<ExpressionBank>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDefinition {
    #[serde(default)]
    persona_name: String,
    #[serde(default)]
    phases: BTreeMap<String, Phase>,
    #[serde(default)]
    phase_dynamics: PhaseDynamics,
    #[serde(default)]
    default_phase: Option<String>,
    #[serde(default)]
    expression_bank: Option<ExpressionBank>,
}

impl PersonaDefinition {
    /// Parse and validate a persona definition document.
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        let raw: RawDefinition = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Parse and validate a persona definition from an already-decoded
    /// JSON value.
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        let raw: RawDefinition = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    /// Read, parse, and validate a persona definition file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn from_raw(raw: RawDefinition) -> Result<Self, EngineError> {
        Ok(Self {
            name: raw.persona_name,
            catalog: PhaseCatalog::new(raw.phases)?,
            dynamics: raw.phase_dynamics,
            default_phase: raw.default_phase,
            expression_bank: raw.expression_bank,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_definition() -> &'static str {
        r#"{
            "persona_name": "warlord",
            "phases": {
                "wrath": {
                    "description": "Short bursts, open threats.",
                    "style_bias": {"Hostility": 0.8, "Dominance": 0.6},
                    "emotion_bias": {"anger": 0.9},
                    "tone_hint": "clipped, menacing",
                    "expression_refs": ["battle_cries", "talk.threats"]
                },
                "calm": {
                    "description": "Measured, strategic speech.",
                    "style_bias": {"Trust": 0.4},
                    "emotion_bias": {"joy": 0.2, "anticipation": 0.3}
                }
            },
            "phase_dynamics": {"alpha": 0.5, "temperature": "hot", "gamma": null},
            "default_phase": "calm"
        }"#
    }

    #[test]
    fn test_catalog_sorted_by_name() {
        let def = PersonaDefinition::from_json(sample_definition()).unwrap();
        let names: Vec<_> = def.catalog.names().collect();
        assert_eq!(names, vec!["calm", "wrath"]);
    }

    #[test]
    fn test_phase_fields_parsed() {
        let def = PersonaDefinition::from_json(sample_definition()).unwrap();
        let wrath = def.catalog.get("wrath").unwrap();
        assert_eq!(wrath.style_bias.hostility, 0.8);
        assert_eq!(wrath.emotion_bias.anger, 0.9);
        assert_eq!(wrath.tone_hint, "clipped, menacing");
        assert_eq!(wrath.expression_refs.len(), 2);
    }

    #[test]
    fn test_out_of_bounds_bias_rejected_at_load() {
        let err = PersonaDefinition::from_json(
            r#"{"phases": {"broken": {"style_bias": {"Trust": 3.0}}}}"#,
        )
        .unwrap_err();
        match err {
            EngineError::Catalog { phase, detail } => {
                assert_eq!(phase, "broken");
                assert!(detail.contains("Trust"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dynamics_ignore_invalid_fields() {
        let def = PersonaDefinition::from_json(sample_definition()).unwrap();
        let params = def.dynamics.resolve(&EngineParams::default());
        assert_eq!(params.alpha, 0.5); // overridden
        assert_eq!(params.temperature, 0.4); // junk string → default
        assert_eq!(params.gamma, 0.05); // null → default
        assert_eq!(params.beta, 0.2); // absent → default
    }

    #[test]
    fn test_empty_document_is_valid() {
        let def = PersonaDefinition::from_json("{}").unwrap();
        assert!(def.catalog.is_empty());
        assert!(def.default_phase.is_none());
    }

    #[test]
    fn test_default_phase_recorded() {
        let def = PersonaDefinition::from_json(sample_definition()).unwrap();
        assert_eq!(def.default_phase.as_deref(), Some("calm"));
    }
}
