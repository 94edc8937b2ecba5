use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit in which maintenance values are recorded for a bike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CountingMethod {
    #[default]
    Distance,
    Hours,
}

impl CountingMethod {
    /// Stored and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CountingMethod::Distance => "DISTANCE",
            CountingMethod::Hours => "HOURS",
        }
    }

    /// Short unit label for display next to a value.
    pub fn unit(&self) -> &'static str {
        match self {
            CountingMethod::Distance => "km",
            CountingMethod::Hours => "h",
        }
    }
}

impl fmt::Display for CountingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountingMethod::Distance => write!(f, "distance"),
            CountingMethod::Hours => write!(f, "hours"),
        }
    }
}

impl FromStr for CountingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "distance" | "km" => Ok(CountingMethod::Distance),
            "hours" | "h" => Ok(CountingMethod::Hours),
            _ => Err(format!(
                "Invalid counting method '{}'. Valid options: distance, hours",
                s
            )),
        }
    }
}
