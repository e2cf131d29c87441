//! Fixed-dimension axis vectors — the atomic unit of persona state.
//!
//! Two flavors share the same machinery:
//!
//! - [`RelationAxes`]: 6 named axes describing the stance toward one
//!   relationship target (Trust, Familiarity, Hostility, Dominance,
//!   Empathy, Instrumentality).
//! - [`EmotionAxes`]: 8 named axes over Plutchik's wheel (joy, trust,
//!   fear, surprise, sadness, disgust, anger, anticipation).
//!
//! Every value lives in `[-1.0, 1.0]` and is clamped on every write,
//! including deserialization. Missing JSON keys default to 0.0 and
//! unknown keys are ignored, so a partially populated object is always
//! accepted.
//!
//! [`RelationBias`] and [`EmotionBias`] are the *unclamped* companions
//! used by phase definitions: persona-authored weights over the same
//! axes. They are range-checked once at catalog load instead of being
//! silently clamped.

use serde::{Deserialize, Deserializer, Serialize};

/// Names of the 6 relation axes, in canonical order.
pub const RELATION_AXIS_NAMES: [&str; 6] = [
    "Trust",
    "Familiarity",
    "Hostility",
    "Dominance",
    "Empathy",
    "Instrumentality",
];

/// Names of the 8 emotion axes (Plutchik's wheel), in canonical order.
pub const EMOTION_AXIS_NAMES: [&str; 8] = [
    "joy",
    "trust",
    "fear",
    "surprise",
    "sadness",
    "disgust",
    "anger",
    "anticipation",
];

/// Clamp a state value into the axis range.
pub fn clamp_axis(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn de_clamped<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(clamp_axis(f64::deserialize(deserializer)?))
}

// ============================================================================
// RelationAxes
// ============================================================================

/// Stance toward one relationship target, one clamped scalar per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationAxes {
    #[serde(rename = "Trust", default, deserialize_with = "de_clamped")]
    pub trust: f64,
    #[serde(rename = "Familiarity", default, deserialize_with = "de_clamped")]
    pub familiarity: f64,
    #[serde(rename = "Hostility", default, deserialize_with = "de_clamped")]
    pub hostility: f64,
    #[serde(rename = "Dominance", default, deserialize_with = "de_clamped")]
    pub dominance: f64,
    #[serde(rename = "Empathy", default, deserialize_with = "de_clamped")]
    pub empathy: f64,
    #[serde(rename = "Instrumentality", default, deserialize_with = "de_clamped")]
    pub instrumentality: f64,
}

impl RelationAxes {
    /// The zero vector — the state of a freshly created relationship.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Values in canonical axis order.
    pub fn values(&self) -> [f64; 6] {
        [
            self.trust,
            self.familiarity,
            self.hostility,
            self.dominance,
            self.empathy,
            self.instrumentality,
        ]
    }

    /// `(axis name, value)` pairs in canonical order.
    pub fn entries(&self) -> [(&'static str, f64); 6] {
        let v = self.values();
        [
            (RELATION_AXIS_NAMES[0], v[0]),
            (RELATION_AXIS_NAMES[1], v[1]),
            (RELATION_AXIS_NAMES[2], v[2]),
            (RELATION_AXIS_NAMES[3], v[3]),
            (RELATION_AXIS_NAMES[4], v[4]),
            (RELATION_AXIS_NAMES[5], v[5]),
        ]
    }

    /// Look up a value by axis name.
    pub fn get(&self, axis: &str) -> Option<f64> {
        match axis {
            "Trust" => Some(self.trust),
            "Familiarity" => Some(self.familiarity),
            "Hostility" => Some(self.hostility),
            "Dominance" => Some(self.dominance),
            "Empathy" => Some(self.empathy),
            "Instrumentality" => Some(self.instrumentality),
            _ => None,
        }
    }

    /// Write a value by axis name, clamped into range.
    ///
    /// Returns `false` for an unknown axis name.
    pub fn set(&mut self, axis: &str, value: f64) -> bool {
        let value = clamp_axis(value);
        match axis {
            "Trust" => self.trust = value,
            "Familiarity" => self.familiarity = value,
            "Hostility" => self.hostility = value,
            "Dominance" => self.dominance = value,
            "Empathy" => self.empathy = value,
            "Instrumentality" => self.instrumentality = value,
            _ => return false,
        }
        true
    }
}

// ============================================================================
// EmotionAxes
// ============================================================================

/// The persona's own emotional state, one clamped scalar per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionAxes {
    #[serde(default, deserialize_with = "de_clamped")]
    pub joy: f64,
    #[serde(default, deserialize_with = "de_clamped")]
    pub trust: f64,
    #[serde(default, deserialize_with = "de_clamped")]
    pub fear: f64,
    #[serde(default, deserialize_with = "de_clamped")]
    pub surprise: f64,
    #[serde(default, deserialize_with = "de_clamped")]
    pub sadness: f64,
    #[serde(default, deserialize_with = "de_clamped")]
    pub disgust: f64,
    #[serde(default, deserialize_with = "de_clamped")]
    pub anger: f64,
    #[serde(default, deserialize_with = "de_clamped")]
    pub anticipation: f64,
}

impl EmotionAxes {
    /// The neutral (all-zero) emotional state.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Values in canonical axis order.
    pub fn values(&self) -> [f64; 8] {
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

    /// `(axis name, value)` pairs in canonical order.
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        let v = self.values();
        let mut out = [("", 0.0); 8];
        for i in 0..8 {
            out[i] = (EMOTION_AXIS_NAMES[i], v[i]);
        }
        out
    }

    /// Look up a value by axis name.
    pub fn get(&self, axis: &str) -> Option<f64> {
        match axis {
            "joy" => Some(self.joy),
            "trust" => Some(self.trust),
            "fear" => Some(self.fear),
            "surprise" => Some(self.surprise),
            "sadness" => Some(self.sadness),
            "disgust" => Some(self.disgust),
            "anger" => Some(self.anger),
            "anticipation" => Some(self.anticipation),
            _ => None,
        }
    }

    /// Write a value by axis name, clamped into range.
    ///
    /// Returns `false` for an unknown axis name.
    pub fn set(&mut self, axis: &str, value: f64) -> bool {
        let value = clamp_axis(value);
        match axis {
            "joy" => self.joy = value,
            "trust" => self.trust = value,
            "fear" => self.fear = value,
            "surprise" => self.surprise = value,
            "sadness" => self.sadness = value,
            "disgust" => self.disgust = value,
            "anger" => self.anger = value,
            "anticipation" => self.anticipation = value,
            _ => return false,
        }
        true
    }
}

// ============================================================================
// Bias weights (phase-authored, unclamped)
// ============================================================================

/// Weights over the relation axes, as authored in a phase definition.
///
/// Unlike [`RelationAxes`], values are stored as written; the catalog
/// loader rejects anything non-finite or outside `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationBias {
    #[serde(rename = "Trust", default)]
    pub trust: f64,
    #[serde(rename = "Familiarity", default)]
    pub familiarity: f64,
    #[serde(rename = "Hostility", default)]
    pub hostility: f64,
    #[serde(rename = "Dominance", default)]
    pub dominance: f64,
    #[serde(rename = "Empathy", default)]
    pub empathy: f64,
    #[serde(rename = "Instrumentality", default)]
    pub instrumentality: f64,
}

impl RelationBias {
    /// Values in canonical axis order.
    pub fn values(&self) -> [f64; 6] {
        [
            self.trust,
            self.familiarity,
            self.hostility,
            self.dominance,
            self.empathy,
            self.instrumentality,
        ]
    }

    /// Dot product against a raw per-axis vector in canonical order.
    pub fn dot(&self, other: &[f64; 6]) -> f64 {
        self.values()
            .iter()
            .zip(other.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Accumulate `w * other` into `self`, axis by axis.
    pub fn add_scaled(&mut self, other: &Self, w: f64) {
        self.trust += w * other.trust;
        self.familiarity += w * other.familiarity;
        self.hostility += w * other.hostility;
        self.dominance += w * other.dominance;
        self.empathy += w * other.empathy;
        self.instrumentality += w * other.instrumentality;
    }

    /// Check that every weight is finite and within `[-1.0, 1.0]`.
    pub fn validate(&self) -> Result<(), String> {
        validate_weights(&self.values(), &RELATION_AXIS_NAMES)
    }
}

/// Weights over the emotion axes, as authored in a phase definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionBias {
    #[serde(default)]
    pub joy: f64,
    #[serde(default)]
    pub trust: f64,
    #[serde(default)]
    pub fear: f64,
    #[serde(default)]
    pub surprise: f64,
    #[serde(default)]
    pub sadness: f64,
    #[serde(default)]
    pub disgust: f64,
    #[serde(default)]
    pub anger: f64,
    #[serde(default)]
    pub anticipation: f64,
}

impl EmotionBias {
    /// Values in canonical axis order.
    pub fn values(&self) -> [f64; 8] {
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

    /// Dot product against a raw per-axis vector in canonical order.
    pub fn dot(&self, other: &[f64; 8]) -> f64 {
        self.values()
            .iter()
            .zip(other.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Accumulate `w * other` into `self`, axis by axis.
    pub fn add_scaled(&mut self, other: &Self, w: f64) {
        self.joy += w * other.joy;
        self.trust += w * other.trust;
        self.fear += w * other.fear;
        self.surprise += w * other.surprise;
        self.sadness += w * other.sadness;
        self.disgust += w * other.disgust;
        self.anger += w * other.anger;
        self.anticipation += w * other.anticipation;
    }

    /// Check that every weight is finite and within `[-1.0, 1.0]`.
    pub fn validate(&self) -> Result<(), String> {
        validate_weights(&self.values(), &EMOTION_AXIS_NAMES)
    }
}

fn validate_weights(values: &[f64], names: &[&str]) -> Result<(), String> {
    for (v, name) in values.iter().zip(names.iter()) {
        if !v.is_finite() {
            return Err(format!("bias '{}' is not a finite number", name));
        }
        if !(-1.0..=1.0).contains(v) {
            return Err(format!("bias '{}' = {} is outside [-1.0, 1.0]", name, v));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
