use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Serialize, Serializer};
use std::fmt;

/// A computed number
#[derive(Debug, Clone, PartialEq)]
pub enum CalcValue {
    Integer(BigInt),
    /// Always finite; the evaluator rejects infinities and NaN.
    Float(f64),
}

impl fmt::Display for CalcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcValue::Integer(n) => write!(f, "{}", n),
            // Debug keeps the trailing ".0" on integral floats ("2.0", not "2")
            CalcValue::Float(x) => write!(f, "{:?}", x),
        }
    }
}

impl From<i64> for CalcValue {
    fn from(n: i64) -> Self {
        CalcValue::Integer(BigInt::from(n))
    }
}

impl From<BigInt> for CalcValue {
    fn from(n: BigInt) -> Self {
        CalcValue::Integer(n)
    }
}

impl Serialize for CalcValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CalcValue::Integer(n) => match n.to_i64() {
                Some(small) => serializer.serialize_i64(small),
                // JSON numbers past i64 lose precision in most clients
                None => serializer.serialize_str(&n.to_string()),
            },
            CalcValue::Float(x) => serializer.serialize_f64(*x),
        }
    }
}

/// User-input failure produced while computing a result.
///
/// These never escape as errors; they are rendered into the textual result
/// the caller sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainFailure {
    InvalidExpression,
    InvalidInput,
    NegativeNumber,
    ExceedsCeiling(u32),
}

impl DomainFailure {
    /// Only the negative-factorial result is memoized; parse and evaluation
    /// failures are recomputed on every request.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, DomainFailure::NegativeNumber)
    }
}

impl fmt::Display for DomainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainFailure::InvalidExpression => f.write_str("Invalid expression"),
            DomainFailure::InvalidInput => f.write_str("Invalid input"),
            DomainFailure::NegativeNumber => f.write_str("Error: negative number"),
            DomainFailure::ExceedsCeiling(limit) => {
                write!(f, "Error: input exceeds limit of {}", limit)
            }
        }
    }
}

/// Result of one computation: a value or a domain failure
#[derive(Debug, Clone, PartialEq)]
pub enum CalcOutcome {
    Value(CalcValue),
    Failure(DomainFailure),
}

impl CalcOutcome {
    pub fn is_cacheable(&self) -> bool {
        match self {
            CalcOutcome::Value(_) => true,
            CalcOutcome::Failure(failure) => failure.is_cacheable(),
        }
    }

    pub fn value(&self) -> Option<&CalcValue> {
        match self {
            CalcOutcome::Value(value) => Some(value),
            CalcOutcome::Failure(_) => None,
        }
    }
}

impl fmt::Display for CalcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcOutcome::Value(value) => value.fmt(f),
            CalcOutcome::Failure(failure) => failure.fmt(f),
        }
    }
}

impl From<CalcValue> for CalcOutcome {
    fn from(value: CalcValue) -> Self {
        CalcOutcome::Value(value)
    }
}

impl From<DomainFailure> for CalcOutcome {
    fn from(failure: DomainFailure) -> Self {
        CalcOutcome::Failure(failure)
    }
}

impl Serialize for CalcOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CalcOutcome::Value(value) => value.serialize(serializer),
            CalcOutcome::Failure(failure) => serializer.collect_str(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_rendering() {
        assert_eq!(CalcValue::from(4).to_string(), "4");
        assert_eq!(CalcValue::Float(2.0).to_string(), "2.0");
        assert_eq!(CalcValue::Float(3.5).to_string(), "3.5");
        assert_eq!(CalcValue::Float(0.1 + 0.2).to_string(), "0.30000000000000004");
    }

    #[test]
    fn test_failure_text_matches_wire_contract() {
        assert_eq!(DomainFailure::InvalidExpression.to_string(), "Invalid expression");
        assert_eq!(DomainFailure::InvalidInput.to_string(), "Invalid input");
        assert_eq!(DomainFailure::NegativeNumber.to_string(), "Error: negative number");
        assert_eq!(
            DomainFailure::ExceedsCeiling(40).to_string(),
            "Error: input exceeds limit of 40"
        );
    }

    #[test]
    fn test_cacheability() {
        assert!(CalcOutcome::from(CalcValue::from(1)).is_cacheable());
        assert!(CalcOutcome::from(DomainFailure::NegativeNumber).is_cacheable());
        assert!(!CalcOutcome::from(DomainFailure::InvalidInput).is_cacheable());
        assert!(!CalcOutcome::from(DomainFailure::InvalidExpression).is_cacheable());
    }

    #[test]
    fn test_outcome_serializes_like_a_result_field() {
        assert_eq!(serde_json::to_value(CalcOutcome::from(CalcValue::from(4))).unwrap(), json!(4));
        assert_eq!(serde_json::to_value(CalcOutcome::from(CalcValue::Float(3.5))).unwrap(), json!(3.5));
        assert_eq!(
            serde_json::to_value(CalcOutcome::from(DomainFailure::NegativeNumber)).unwrap(),
            json!("Error: negative number")
        );

        let big: BigInt = "1000000000000000000000".parse().unwrap();
        assert_eq!(
            serde_json::to_value(CalcValue::Integer(big)).unwrap(),
            json!("1000000000000000000000")
        );
    }
}
