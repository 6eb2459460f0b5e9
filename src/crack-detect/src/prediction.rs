//! Response schema and the formatter from a probability vector.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Crack")]
    Crack,
    #[serde(rename = "No Crack")]
    NoCrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub crack: f32,
    pub no_crack: f32,
}

/// Final prediction for one uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: Label,
    pub confidence: f32,
    pub probabilities: Probabilities,
}

impl Prediction {
    /// Shape a softmax output `[p_no_crack, p_crack]` into the response
    /// schema. A tie goes to `Crack`.
    pub fn from_probabilities(probabilities: [f32; 2]) -> Self {
        let [no_crack, crack] = probabilities;
        let label = if crack >= no_crack {
            Label::Crack
        } else {
            Label::NoCrack
        };

        Prediction {
            prediction: label,
            confidence: crack.max(no_crack),
            probabilities: Probabilities { crack, no_crack },
        }
    }
}
