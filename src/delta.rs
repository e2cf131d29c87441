//! One turn's proposed change vector, as produced by the external
//! delta analyzer.
//!
//! A delta is a *change*, not an absolute value, and the producer is
//! not trusted to cover every axis or every target. Each axis
//! component is therefore a three-way value:
//!
//! - key absent → a change of `0.0` (which still nudges emotion axes
//!   toward zero on every turn),
//! - numeric → that change, clamped to `[-1.0, 1.0]`,
//! - anything else (strings, nulls, NaN) → [`AxisChange::Skip`]: the
//!   prior state value is retained untouched.
//!
//! Deserialization of a delta never fails on partial or malformed
//! objects; the worst case is a delta that changes nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ============================================================================
// AxisChange
// ============================================================================

/// A single axis component of a delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisChange {
    /// Apply this change through the EMA update.
    Apply(f64),
    /// The component was malformed; leave the prior value untouched.
    Skip,
}

impl Default for AxisChange {
    /// An absent component is a zero change, not a skip.
    fn default() -> Self {
        AxisChange::Apply(0.0)
    }
}

impl AxisChange {
    /// The change to apply, or `None` for a skipped component.
    pub fn applied(&self) -> Option<f64> {
        match self {
            AxisChange::Apply(v) => Some(*v),
            AxisChange::Skip => None,
        }
    }

    /// The change as a plain number; skipped components contribute 0.
    pub fn or_zero(&self) -> f64 {
        self.applied().unwrap_or(0.0)
    }
}

impl<'de> Deserialize<'de> for AxisChange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value.as_f64() {
            Some(v) if v.is_finite() => AxisChange::Apply(v.clamp(-1.0, 1.0)),
            _ => AxisChange::Skip,
        })
    }
}

impl Serialize for AxisChange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            AxisChange::Apply(v) => serializer.serialize_f64(*v),
            AxisChange::Skip => serializer.serialize_none(),
        }
    }
}

// ============================================================================
// Per-flavor deltas
// ============================================================================

/// Proposed changes to the 8 emotion axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionDelta {
    #[serde(default)]
    pub joy: AxisChange,
    #[serde(default)]
    pub trust: AxisChange,
    #[serde(default)]
    pub fear: AxisChange,
    #[serde(default)]
    pub surprise: AxisChange,
    #[serde(default)]
    pub sadness: AxisChange,
    #[serde(default)]
    pub disgust: AxisChange,
    #[serde(default)]
    pub anger: AxisChange,
    #[serde(default)]
    pub anticipation: AxisChange,
}

impl EmotionDelta {
    /// Components in canonical axis order.
    pub fn changes(&self) -> [AxisChange; 8] {
        [
            self.joy,
            self.trust,
            self.fear,
            self.surprise,
            self.sadness,
            self.disgust,
            self.anger,
            self.anticipation,
        ]
    }

    /// Applied changes in canonical order, with skips as 0.
    pub fn values_or_zero(&self) -> [f64; 8] {
        let mut out = [0.0; 8];
        for (i, c) in self.changes().iter().enumerate() {
            out[i] = c.or_zero();
        }
        out
    }
}

/// Proposed changes to the 6 relation axes of one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationDelta {
    #[serde(rename = "Trust", default)]
    pub trust: AxisChange,
    #[serde(rename = "Familiarity", default)]
    pub familiarity: AxisChange,
    #[serde(rename = "Hostility", default)]
    pub hostility: AxisChange,
    #[serde(rename = "Dominance", default)]
    pub dominance: AxisChange,
    #[serde(rename = "Empathy", default)]
    pub empathy: AxisChange,
    #[serde(rename = "Instrumentality", default)]
    pub instrumentality: AxisChange,
}

impl RelationDelta {
    /// Components in canonical axis order.
    pub fn changes(&self) -> [AxisChange; 6] {
        [
            self.trust,
            self.familiarity,
            self.hostility,
            self.dominance,
            self.empathy,
            self.instrumentality,
        ]
    }

    /// Applied changes in canonical order, with skips as 0.
    pub fn values_or_zero(&self) -> [f64; 6] {
        let mut out = [0.0; 6];
        for (i, c) in self.changes().iter().enumerate() {
            out[i] = c.or_zero();
        }
        out
    }
}

// ============================================================================
// Delta
// ============================================================================

/// A full turn delta: emotion changes plus per-target relation changes.
///
/// Targets whose value is not a JSON object are dropped wholesale; a
/// target absent from the delta leaves that relationship untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, deserialize_with = "de_emotion")]
    pub emotion_axes: EmotionDelta,
    #[serde(default, deserialize_with = "de_targets")]
    pub relations: BTreeMap<String, RelationDelta>,
}

impl Delta {
    /// A delta that changes nothing beyond the usual emotion decay.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Parse a delta from an already-decoded JSON value.
    ///
    /// Anything that is not an object degrades to [`Delta::neutral`].
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Parse a delta from raw JSON text, degrading to neutral on junk.
    pub fn from_json(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_default()
    }

    /// Relation changes summed across every mentioned target, in
    /// canonical axis order. This pooled vector is what phase bias
    /// weights are dotted against.
    pub fn pooled_relation_changes(&self) -> [f64; 6] {
        let mut pooled = [0.0; 6];
        for delta in self.relations.values() {
            for (i, v) in delta.values_or_zero().iter().enumerate() {
                pooled[i] += v;
            }
        }
        pooled
    }
}

fn de_emotion<'de, D>(deserializer: D) -> Result<EmotionDelta, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn de_targets<'de, D>(deserializer: D) -> Result<BTreeMap<String, RelationDelta>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut targets = BTreeMap::new();
    if let Value::Object(entries) = value {
        for (target, axes) in entries {
            if !axes.is_object() {
                continue;
            }
            if let Ok(delta) = serde_json::from_value::<RelationDelta>(axes) {
                targets.insert(target, delta);
            }
        }
    }
    Ok(targets)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_axis_is_zero_change() {
        let delta = Delta::from_json(r#"{"emotion_axes": {"joy": 0.5}}"#);
        assert_eq!(delta.emotion_axes.joy, AxisChange::Apply(0.5));
        assert_eq!(delta.emotion_axes.anger, AxisChange::Apply(0.0));
    }

    #[test]
    fn test_malformed_axis_is_skip() {
        let delta = Delta::from_json(
            r#"{"emotion_axes": {"joy": "very", "anger": null, "fear": 0.2}}"#,
        );
        assert_eq!(delta.emotion_axes.joy, AxisChange::Skip);
        assert_eq!(delta.emotion_axes.anger, AxisChange::Skip);
        assert_eq!(delta.emotion_axes.fear, AxisChange::Apply(0.2));
    }

    #[test]
    fn test_changes_clamped() {
        let delta = Delta::from_json(r#"{"emotion_axes": {"joy": 4.0}}"#);
        assert_eq!(delta.emotion_axes.joy, AxisChange::Apply(1.0));
    }

    #[test]
    fn test_malformed_target_dropped() {
        let delta = Delta::from_json(
            r#"{"relations": {"user": {"Trust": 0.3}, "rival": "unknown"}}"#,
        );
        assert!(delta.relations.contains_key("user"));
        assert!(!delta.relations.contains_key("rival"));
    }

    #[test]
    fn test_junk_document_degrades_to_neutral() {
        assert_eq!(Delta::from_json("not json at all"), Delta::neutral());
        assert_eq!(Delta::from_json(r#"[1, 2, 3]"#), Delta::neutral());
        assert_eq!(
            Delta::from_json(r#"{"emotion_axes": 7, "relations": false}"#),
            Delta::neutral()
        );
    }

    #[test]
    fn test_pooled_relation_changes_sums_targets() {
        let delta = Delta::from_json(
            r#"{"relations": {
                "user":  {"Trust": 0.4, "Hostility": -0.1},
                "rival": {"Trust": 0.2, "Dominance": 0.5}
            }}"#,
        );
        let pooled = delta.pooled_relation_changes();
        assert!((pooled[0] - 0.6).abs() < 1e-12); // Trust
        assert!((pooled[2] + 0.1).abs() < 1e-12); // Hostility
        assert!((pooled[3] - 0.5).abs() < 1e-12); // Dominance
    }

    #[test]
    fn test_skip_contributes_nothing_to_pool() {
        let delta = Delta::from_json(
            r#"{"relations": {"user": {"Trust": "broken", "Empathy": 0.3}}}"#,
        );
        let pooled = delta.pooled_relation_changes();
        assert_eq!(pooled[0], 0.0);
        assert!((pooled[4] - 0.3).abs() < 1e-12);
    }
}
