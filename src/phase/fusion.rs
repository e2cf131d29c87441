//! Phase fusion — collapsing the weight distribution into one
//! descriptor for prompt construction.
//!
//! Rather than picking the single dominant phase, fusion blends every
//! phase with positive weight: bias vectors are probability-weighted
//! sums, descriptions are concatenated with their weights annotated,
//! and expression references are ranked by accumulated weight. The
//! result is ephemeral — it is recomputed per turn and never persisted.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::axes::{EmotionBias, RelationBias};
use crate::phase::catalog::{Phase, PhaseCatalog};
use crate::state::PersonaState;

/// The blended descriptor produced by [`fuse_phase_config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FusedPhase {
    /// Weight-annotated concatenation of each contributing phase's
    /// description, in catalog order. Read by humans and LLMs, never
    /// parsed downstream.
    pub description: String,

    /// Expression-bank references ranked by accumulated weight,
    /// highest first; ties keep encounter order.
    pub expression_refs: Vec<String>,

    /// Probability-weighted sum of the contributing style biases.
    pub style_bias: RelationBias,

    /// Probability-weighted sum of the contributing emotion biases.
    pub emotion_bias: EmotionBias,
}

/// Blend the catalog under the given weight distribution.
///
/// Phases with zero, negative, missing, or non-finite weight
/// contribute nothing. When no phase contributes — empty catalog,
/// empty weights, or total weight zero — the result is the empty
/// [`FusedPhase`]; this function never fails.
pub fn fuse_phase_config(catalog: &PhaseCatalog, weights: &BTreeMap<String, f64>) -> FusedPhase {
    let mut fused = FusedPhase::default();
    if catalog.is_empty() || weights.is_empty() {
        return fused;
    }

    let mut description_chunks: Vec<String> = Vec::new();
    let mut ref_order: Vec<String> = Vec::new();
    let mut ref_scores: BTreeMap<String, f64> = BTreeMap::new();

    for phase in catalog.iter() {
        let w = match weights.get(&phase.name) {
            Some(w) if w.is_finite() && *w > 0.0 => *w,
            _ => continue,
        };

        let description = phase.description.trim();
        if !description.is_empty() {
            description_chunks.push(format!("[{} (weight {:.2})] {}", phase.name, w, description));
        }

        fused.style_bias.add_scaled(&phase.style_bias, w);
        fused.emotion_bias.add_scaled(&phase.emotion_bias, w);

        for reference in &phase.expression_refs {
            if !ref_scores.contains_key(reference) {
                ref_order.push(reference.clone());
            }
            *ref_scores.entry(reference.clone()).or_insert(0.0) += w;
        }
    }

    fused.description = description_chunks.join("\n");

    // Stable sort: equal scores keep encounter order.
    ref_order.sort_by(|a, b| {
        ref_scores[b]
            .partial_cmp(&ref_scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.expression_refs = ref_order;

    fused
}

/// Pick the single phase the persona is currently "in".
///
/// Fallback chain: the state's dominant phase when it still names a
/// catalog member → the highest stored weight among catalog members →
/// the author's designated default → the first phase in canonical
/// order. `None` only for an empty catalog.
pub fn select_active_phase<'a>(
    catalog: &'a PhaseCatalog,
    state: &PersonaState,
    default_phase: Option<&str>,
) -> Option<&'a Phase> {
    if catalog.is_empty() {
        return None;
    }

    if let Some(name) = &state.dominant_phase {
        if let Some(phase) = catalog.get(name) {
            return Some(phase);
        }
    }

    let mut best: Option<(&Phase, f64)> = None;
    for phase in catalog.iter() {
        if let Some(w) = state.phase_weights.get(&phase.name) {
            if w.is_finite() {
                match best {
                    Some((_, best_w)) if *w <= best_w => {}
                    _ => best = Some((phase, *w)),
                }
            }
        }
    }
    if let Some((phase, _)) = best {
        return Some(phase);
    }

    if let Some(name) = default_phase {
        if let Some(phase) = catalog.get(name) {
            return Some(phase);
        }
    }

    catalog.first()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::catalog::PersonaDefinition;

    fn catalog_ab() -> PhaseCatalog {
        PersonaDefinition::from_json(
            r#"{"phases": {
                "a": {
                    "description": "steady and open",
                    "style_bias": {"Trust": 1.0},
                    "expression_refs": ["talk.intro", "shared"]
                },
                "b": {
                    "description": "guarded",
                    "style_bias": {"Trust": -1.0},
                    "expression_refs": ["shared", "talk.retorts"]
                }
            }}"#,
        )
        .unwrap()
        .catalog
    }

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(n, w)| (n.to_string(), *w)).collect()
    }

    #[test]
    fn test_weighted_bias_sum() {
        let fused = fuse_phase_config(&catalog_ab(), &weights(&[("a", 0.7), ("b", 0.3)]));
        assert!((fused.style_bias.trust - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_description_annotated_in_catalog_order() {
        let fused = fuse_phase_config(&catalog_ab(), &weights(&[("a", 0.25), ("b", 0.75)]));
        let lines: Vec<&str> = fused.description.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[a (weight 0.25)]"));
        assert!(lines[0].ends_with("steady and open"));
        assert!(lines[1].starts_with("[b (weight 0.75)]"));
    }

    #[test]
    fn test_zero_weight_phase_contributes_nothing() {
        let fused = fuse_phase_config(&catalog_ab(), &weights(&[("a", 1.0), ("b", 0.0)]));
        assert!((fused.style_bias.trust - 1.0).abs() < 1e-12);
        assert!(!fused.description.contains("guarded"));
        assert!(!fused.expression_refs.contains(&"talk.retorts".to_string()));
    }

    #[test]
    fn test_expression_refs_ranked_by_accumulated_weight() {
        // "shared" appears in both phases: 0.6 + 0.4 = 1.0, beating
        // either phase's own refs.
        let fused = fuse_phase_config(&catalog_ab(), &weights(&[("a", 0.6), ("b", 0.4)]));
        assert_eq!(fused.expression_refs[0], "shared");
        assert_eq!(
            fused.expression_refs,
            vec!["shared", "talk.intro", "talk.retorts"]
        );
    }

    #[test]
    fn test_expression_ref_ties_keep_encounter_order() {
        let fused = fuse_phase_config(&catalog_ab(), &weights(&[("a", 0.5), ("b", 0.5)]));
        // "shared" scores 1.0; the two singletons tie at 0.5 and keep
        // encounter order (a's refs before b's).
        assert_eq!(
            fused.expression_refs,
            vec!["shared", "talk.intro", "talk.retorts"]
        );
    }

    #[test]
    fn test_degenerate_inputs_yield_empty_fusion() {
        let empty = FusedPhase::default();
        assert_eq!(
            fuse_phase_config(&PhaseCatalog::empty(), &weights(&[("a", 1.0)])),
            empty
        );
        assert_eq!(fuse_phase_config(&catalog_ab(), &BTreeMap::new()), empty);
        assert_eq!(
            fuse_phase_config(&catalog_ab(), &weights(&[("a", 0.0), ("b", 0.0)])),
            empty
        );
    }

    #[test]
    fn test_select_active_phase_fallback_chain() {
        let catalog = catalog_ab();
        let mut state = PersonaState::initial();

        // Nothing stored → first phase in canonical order.
        assert_eq!(select_active_phase(&catalog, &state, None).unwrap().name, "a");

        // Author default wins over the bare first-phase fallback.
        assert_eq!(
            select_active_phase(&catalog, &state, Some("b")).unwrap().name,
            "b"
        );

        // Stored weights beat the default.
        state.phase_weights = weights(&[("a", 0.2), ("b", 0.8)]);
        assert_eq!(
            select_active_phase(&catalog, &state, Some("a")).unwrap().name,
            "b"
        );

        // A valid dominant phase beats everything.
        state.dominant_phase = Some("a".to_string());
        assert_eq!(select_active_phase(&catalog, &state, None).unwrap().name, "a");

        // A stale dominant phase falls through to the weights.
        state.dominant_phase = Some("gone".to_string());
        assert_eq!(select_active_phase(&catalog, &state, None).unwrap().name, "b");
    }

    #[test]
    fn test_select_active_phase_empty_catalog() {
        let state = PersonaState::initial();
        assert!(select_active_phase(&PhaseCatalog::empty(), &state, None).is_none());
    }
}
