use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operation type name outside the supported set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid operation type: {0}")]
pub struct UnknownOperationType(pub String);

/// The three calculations exposed by the service
///
/// Each operation owns its own cache partition and maps to the session
/// choice number used by `last_choice` (0 is reserved for "nothing chosen").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Calculator,
    Fibonacci,
    Factorial,
}

impl OperationType {
    pub const ALL: [OperationType; 3] = [
        OperationType::Calculator,
        OperationType::Fibonacci,
        OperationType::Factorial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Calculator => "calculator",
            OperationType::Fibonacci => "fibonacci",
            OperationType::Factorial => "factorial",
        }
    }

    /// Session choice number for this operation
    pub fn choice(&self) -> u8 {
        match self {
            OperationType::Calculator => 1,
            OperationType::Fibonacci => 2,
            OperationType::Factorial => 3,
        }
    }

    pub fn from_choice(choice: u8) -> Option<Self> {
        match choice {
            1 => Some(OperationType::Calculator),
            2 => Some(OperationType::Fibonacci),
            3 => Some(OperationType::Factorial),
            _ => None,
        }
    }

    /// Normalize a raw input into the key used inside this operation's partition.
    ///
    /// Calculator keys are the trimmed expression. Integer operations key on the
    /// decimal form of the parsed value so `" 7 "` and `"+7"` share an entry;
    /// unparsable input falls back to the trimmed text.
    pub fn cache_key(&self, input: &str) -> String {
        match self {
            OperationType::Calculator => input.trim().to_string(),
            OperationType::Fibonacci | OperationType::Factorial => match parse_integer(input) {
                Some(n) => n.to_string(),
                None => input.trim().to_string(),
            },
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = UnknownOperationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calculator" => Ok(OperationType::Calculator),
            "fibonacci" => Ok(OperationType::Fibonacci),
            "factorial" => Ok(OperationType::Factorial),
            other => Err(UnknownOperationType(other.to_string())),
        }
    }
}

/// Parse a trimmed decimal integer of any size
pub fn parse_integer(input: &str) -> Option<BigInt> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<BigInt>().ok()
}
