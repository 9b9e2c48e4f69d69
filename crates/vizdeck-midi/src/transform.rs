//! Value shaping for continuous controls

use serde::{Deserialize, Serialize};

/// Response curve applied before scaling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformCurve {
    #[default]
    Linear,
    /// Square root: more resolution at the low end
    Logarithmic,
    /// Square: more resolution at the high end
    Exponential,
}

/// Maps a normalized control value into `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueTransform {
    pub min: f32,
    pub max: f32,
    pub curve: TransformCurve,
    pub invert: bool,
}

impl Default for ValueTransform {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            curve: TransformCurve::Linear,
            invert: false,
        }
    }
}

impl ValueTransform {
    /// Apply to a value in 0.0-1.0 (inputs outside are clamped)
    pub fn apply(&self, value: f32) -> f32 {
        let value = value.clamp(0.0, 1.0);
        let value = if self.invert { 1.0 - value } else { value };

        let curved = match self.curve {
            TransformCurve::Linear => value,
            TransformCurve::Logarithmic => value.sqrt(),
            TransformCurve::Exponential => value * value,
        };

        self.min + curved * (self.max - self.min)
    }
}
