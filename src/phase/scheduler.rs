//! Phase weight scheduler — soft-arg-max over accumulated evidence.
//!
//! Every turn, each phase's prior weight is nudged by how well the
//! turn's delta aligns with that phase's bias vectors, perturbed by a
//! small uniform noise term, then renormalized through a temperature
//! softmax. The output is always a proper probability distribution:
//! weights sum to 1 and are strictly positive.
//!
//! The noise term is the one stochastic element in the whole engine,
//! so it lives behind the [`NoiseSource`] seam: production uses
//! [`UniformNoise`], tests use [`NoNoise`] or [`ScriptedNoise`].

use std::collections::BTreeMap;

use rand::Rng;

use crate::delta::Delta;
use crate::phase::catalog::{EngineParams, PhaseCatalog};

// ============================================================================
// NoiseSource
// ============================================================================

/// Injectable source of the scheduler's stochastic perturbation.
pub trait NoiseSource: Send {
    /// Draw one perturbation uniformly from `[-gamma, gamma]`.
    fn sample(&mut self, gamma: f64) -> f64;

    /// Draw one value in `[0, 1)`, used wherever the engine needs an
    /// unbiased pick (e.g. expression sampling).
    fn unit(&mut self) -> f64 {
        ((self.sample(0.5) + 0.5).clamp(0.0, 1.0)).min(1.0 - f64::EPSILON)
    }
}

/// Thread-local uniform randomness. The production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformNoise;

impl NoiseSource for UniformNoise {
    fn sample(&mut self, gamma: f64) -> f64 {
        if gamma <= 0.0 || !gamma.is_finite() {
            return 0.0;
        }
        rand::thread_rng().gen_range(-gamma..=gamma)
    }

    fn unit(&mut self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// No perturbation at all. Makes the scheduler fully deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNoise;

impl NoiseSource for NoNoise {
    fn sample(&mut self, _gamma: f64) -> f64 {
        0.0
    }
}

/// Replays a fixed sequence of values, then zeros. Test harness for
/// pinning down exactly what the perturbation does.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNoise {
    values: Vec<f64>,
    index: usize,
}

impl ScriptedNoise {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, index: 0 }
    }

    fn next(&mut self) -> f64 {
        let v = self.values.get(self.index).copied().unwrap_or(0.0);
        self.index += 1;
        v
    }
}

impl NoiseSource for ScriptedNoise {
    /// Returns the scripted values verbatim; `gamma` is ignored so a
    /// test can force any perturbation it wants.
    fn sample(&mut self, _gamma: f64) -> f64 {
        self.next()
    }

    fn unit(&mut self) -> f64 {
        self.next().clamp(0.0, 1.0).min(1.0 - f64::EPSILON)
    }
}

// ============================================================================
// Weight update
// ============================================================================

/// Result of one scheduler step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseWeightUpdate {
    /// New probability distribution over the catalog, sums to 1.
    /// Empty when the catalog is empty.
    pub weights: BTreeMap<String, f64>,
    /// Arg-max of `weights`; first in canonical order on exact ties.
    pub dominant_phase: Option<String>,
}

/// Run one soft-arg-max scheduler step.
///
/// Starting weights come from `old_weights` when its key set matches
/// the catalog exactly; otherwise the distribution is re-initialized
/// uniformly (covers the first turn and any catalog edit between
/// turns). Each phase then accumulates:
///
/// - `alpha` × (style bias · relation changes pooled across all
///   mentioned targets),
/// - `beta` × (emotion bias · emotion changes),
/// - one draw from `noise` in `[-gamma, gamma]`,
///
/// and the accumulated evidence is normalized with a temperature
/// softmax. An empty catalog is a no-op: empty weights, no dominant
/// phase.
pub fn update_phase_weights(
    catalog: &PhaseCatalog,
    old_weights: &BTreeMap<String, f64>,
    delta: &Delta,
    params: &EngineParams,
    noise: &mut dyn NoiseSource,
) -> PhaseWeightUpdate {
    if catalog.is_empty() {
        return PhaseWeightUpdate::default();
    }

    let matches_catalog = old_weights.len() == catalog.len()
        && catalog.names().all(|name| {
            old_weights
                .get(name)
                .map(|w| w.is_finite())
                .unwrap_or(false)
        });
    let uniform = 1.0 / catalog.len() as f64;

    let pooled_relations = delta.pooled_relation_changes();
    let emotion_changes = delta.emotion_axes.values_or_zero();

    let mut raw: Vec<(&str, f64)> = Vec::with_capacity(catalog.len());
    for phase in catalog.iter() {
        let prior = if matches_catalog {
            old_weights[&phase.name]
        } else {
            uniform
        };
        let relation_contribution = phase.style_bias.dot(&pooled_relations);
        let emotion_contribution = phase.emotion_bias.dot(&emotion_changes);
        let value = prior
            + params.alpha * relation_contribution
            + params.beta * emotion_contribution
            + noise.sample(params.gamma);
        raw.push((phase.name.as_str(), value));
    }

    let normed = softmax(raw.iter().map(|(_, v)| *v), params.temperature);

    let mut weights = BTreeMap::new();
    let mut dominant: Option<(&str, f64)> = None;
    for ((name, _), w) in raw.iter().copied().zip(normed) {
        weights.insert(name.to_string(), w);
        match dominant {
            Some((_, best)) if w <= best => {}
            _ => dominant = Some((name, w)),
        }
    }

    PhaseWeightUpdate {
        weights,
        dominant_phase: dominant.map(|(name, _)| name.to_string()),
    }
}

/// Temperature softmax, max-shifted so `exp` cannot overflow.
fn softmax(values: impl Iterator<Item = f64> + Clone, temperature: f64) -> Vec<f64> {
    let t = temperature.max(1e-6);
    let max = values
        .clone()
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.map(|v| ((v - max) / t).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Reconcile a stored weight distribution with the current catalog.
///
/// Keeps only finite weights for phases that still exist, renormalizes
/// them to sum to 1, and falls back to the uniform distribution when
/// nothing usable survives. This is the read-side companion of
/// [`update_phase_weights`] for state that may predate a catalog edit.
pub fn normalize_stored_weights(
    catalog: &PhaseCatalog,
    stored: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    if catalog.is_empty() {
        return BTreeMap::new();
    }

    let mut weights: BTreeMap<String, f64> = BTreeMap::new();
    for phase in catalog.iter() {
        if let Some(w) = stored.get(&phase.name) {
            if w.is_finite() && *w >= 0.0 {
                weights.insert(phase.name.clone(), *w);
            }
        }
    }

    let total: f64 = weights.values().sum();
    if weights.is_empty() || total <= 0.0 {
        let uniform = 1.0 / catalog.len() as f64;
        return catalog
            .names()
            .map(|name| (name.to_string(), uniform))
            .collect();
    }

    for w in weights.values_mut() {
        *w /= total;
    }
    weights
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::catalog::PersonaDefinition;

    fn two_phase_persona() -> PersonaDefinition {
        PersonaDefinition::from_json(
            r#"{
                "persona_name": "duelist",
                "phases": {
                    "calm":  {"emotion_bias": {"anger": -1.0}},
                    "angry": {"emotion_bias": {"anger": 1.0}}
                }
            }"#,
        )
        .unwrap()
    }

    fn uniform_weights(names: &[&str]) -> BTreeMap<String, f64> {
        let w = 1.0 / names.len() as f64;
        names.iter().map(|n| (n.to_string(), w)).collect()
    }

    #[test]
    fn test_weights_sum_to_one() {
        let persona = two_phase_persona();
        let delta = Delta::from_json(r#"{"emotion_axes": {"anger": 0.7, "joy": -0.3}}"#);
        let update = update_phase_weights(
            &persona.catalog,
            &BTreeMap::new(),
            &delta,
            &EngineParams::default(),
            &mut UniformNoise,
        );
        let total: f64 = update.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(update.weights.values().all(|w| *w > 0.0));
    }

    #[test]
    fn test_empty_catalog_is_noop() {
        let update = update_phase_weights(
            &PhaseCatalog::empty(),
            &BTreeMap::new(),
            &Delta::neutral(),
            &EngineParams::default(),
            &mut NoNoise,
        );
        assert!(update.weights.is_empty());
        assert!(update.dominant_phase.is_none());
    }

    #[test]
    fn test_mismatched_keys_reinitialize_uniformly() {
        let persona = two_phase_persona();
        let stale = uniform_weights(&["calm", "furious"]); // "furious" no longer exists
        let update = update_phase_weights(
            &persona.catalog,
            &stale,
            &Delta::neutral(),
            &EngineParams::default(),
            &mut NoNoise,
        );
        // Uniform start + zero delta + no noise → still uniform.
        for w in update.weights.values() {
            assert!((w - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_anger_delta_lifts_anger_biased_phase() {
        let persona = two_phase_persona();
        let delta = Delta::from_json(r#"{"emotion_axes": {"anger": 1.0}}"#);
        let params = EngineParams {
            beta: 0.2,
            gamma: 0.0,
            ..EngineParams::default()
        };
        let update = update_phase_weights(
            &persona.catalog,
            &uniform_weights(&["angry", "calm"]),
            &delta,
            &params,
            &mut NoNoise,
        );
        assert!(update.weights["angry"] > update.weights["calm"]);
        assert_eq!(update.dominant_phase.as_deref(), Some("angry"));
    }

    #[test]
    fn test_relation_contribution_pools_targets() {
        let persona = PersonaDefinition::from_json(
            r#"{"phases": {
                "friendly": {"style_bias": {"Trust": 1.0}},
                "wary":     {"style_bias": {"Trust": -1.0}}
            }}"#,
        )
        .unwrap();
        // Trust rises for two different targets; both pool into the
        // same contribution.
        let delta = Delta::from_json(
            r#"{"relations": {
                "user":  {"Trust": 0.4},
                "rival": {"Trust": 0.4}
            }}"#,
        );
        let update = update_phase_weights(
            &persona.catalog,
            &BTreeMap::new(),
            &delta,
            &EngineParams { gamma: 0.0, ..EngineParams::default() },
            &mut NoNoise,
        );
        assert!(update.weights["friendly"] > update.weights["wary"]);
    }

    #[test]
    fn test_deterministic_with_noise_disabled() {
        let persona = two_phase_persona();
        let delta = Delta::from_json(r#"{"emotion_axes": {"anger": 0.3}}"#);
        let old = uniform_weights(&["angry", "calm"]);
        let params = EngineParams::default();

        let a = update_phase_weights(&persona.catalog, &old, &delta, &params, &mut NoNoise);
        let b = update_phase_weights(&persona.catalog, &old, &delta, &params, &mut NoNoise);
        assert_eq!(a, b);
    }

    #[test]
    fn test_scripted_noise_can_flip_the_outcome() {
        let persona = two_phase_persona();
        let old = uniform_weights(&["angry", "calm"]);
        let params = EngineParams::default();

        // Catalog order is [angry, calm]; push "calm" hard.
        let mut noise = ScriptedNoise::new(vec![0.0, 5.0]);
        let update =
            update_phase_weights(&persona.catalog, &old, &Delta::neutral(), &params, &mut noise);
        assert_eq!(update.dominant_phase.as_deref(), Some("calm"));
    }

    #[test]
    fn test_normalize_stored_weights_filters_and_rescales() {
        let persona = two_phase_persona();
        let mut stored = BTreeMap::new();
        stored.insert("angry".to_string(), 3.0);
        stored.insert("calm".to_string(), 1.0);
        stored.insert("ghost".to_string(), 9.0); // not in the catalog

        let weights = normalize_stored_weights(&persona.catalog, &stored);
        assert_eq!(weights.len(), 2);
        assert!((weights["angry"] - 0.75).abs() < 1e-9);
        assert!((weights["calm"] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_stored_weights_uniform_fallback() {
        let persona = two_phase_persona();
        let weights = normalize_stored_weights(&persona.catalog, &BTreeMap::new());
        assert!((weights["angry"] - 0.5).abs() < 1e-9);
        assert!((weights["calm"] - 0.5).abs() < 1e-9);
    }
}
