//! Calculation engine
//!
//! Computes results for the three operation types and memoizes them in the
//! shared [`CacheStore`]. User-input problems never surface as errors here;
//! they become [`DomainFailure`]s rendered into the textual result. The only
//! error path is a failed worker task.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::logging::sanitize_log_message;
use crate::observability::record_computation;
use crate::schema::{parse_integer, CalcOutcome, CalcValue, DomainFailure, OperationType};

pub mod expression;
pub mod sequences;

pub use expression::{ArithmeticEvaluator, EvalError, ExpressionEvaluator};

/// Recursion above this `n` is logged, it takes noticeably long
const SLOW_FIBONACCI_N: i64 = 30;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Calculation worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Worker(err.to_string())
    }
}

/// Input ceilings applied regardless of role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub fibonacci_ceiling: u32,
    pub factorial_ceiling: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            fibonacci_ceiling: 40,
            factorial_ceiling: 20_000,
        }
    }
}

/// Outcome of one lookup-or-compute pass
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: CalcOutcome,
    pub cached: bool,
    /// Normalized key the result is stored under
    pub cache_key: String,
    /// Set only when the result was freshly computed
    pub calculation_time: Option<Duration>,
}

#[derive(Clone)]
pub struct CalculationEngine {
    cache: CacheStore,
    evaluator: Arc<dyn ExpressionEvaluator>,
    limits: EngineLimits,
}

impl CalculationEngine {
    pub fn new(cache: CacheStore, limits: EngineLimits) -> Self {
        Self::with_evaluator(cache, Arc::new(ArithmeticEvaluator), limits)
    }

    pub fn with_evaluator(
        cache: CacheStore,
        evaluator: Arc<dyn ExpressionEvaluator>,
        limits: EngineLimits,
    ) -> Self {
        Self {
            cache,
            evaluator,
            limits,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Serve from cache when possible, otherwise compute and memoize.
    ///
    /// Exactly one cache lookup per call; one cache write per cacheable
    /// freshly computed outcome, none on a hit.
    pub async fn evaluate(
        &self,
        operation: OperationType,
        input: &str,
    ) -> Result<Evaluation, EngineError> {
        let cache_key = operation.cache_key(input);

        if let Some(outcome) = self.cache.get(operation, &cache_key).await {
            return Ok(Evaluation {
                outcome,
                cached: true,
                cache_key,
                calculation_time: None,
            });
        }

        let started = Instant::now();
        let outcome = self.compute(operation, input).await?;
        let elapsed = started.elapsed();

        if outcome.is_cacheable() {
            self.cache.set(operation, &cache_key, outcome.clone()).await;
        }

        Ok(Evaluation {
            outcome,
            cached: false,
            cache_key,
            calculation_time: Some(elapsed),
        })
    }

    /// Compute without touching the cache
    pub async fn compute(
        &self,
        operation: OperationType,
        input: &str,
    ) -> Result<CalcOutcome, EngineError> {
        let logged_input = sanitize_log_message(input.trim());
        debug!(operation = %operation, input = %logged_input, "Calculation started");
        let started = Instant::now();

        let outcome = match operation {
            OperationType::Calculator => self.calculate_expression(input).await?,
            OperationType::Fibonacci => self.calculate_fibonacci(input).await?,
            OperationType::Factorial => self.calculate_factorial(input).await?,
        };

        record_computation(operation, outcome.value().is_none(), started.elapsed());
        info!(
            event = "CALCULATION_COMPLETED",
            operation = %operation,
            input = %logged_input,
            result = %outcome,
            "Calculation completed"
        );

        Ok(outcome)
    }

    async fn calculate_expression(&self, input: &str) -> Result<CalcOutcome, EngineError> {
        let evaluator = Arc::clone(&self.evaluator);
        let expression = input.trim().to_string();
        let (expression, evaluated) = tokio::task::spawn_blocking(move || {
            let evaluated = evaluator.evaluate(&expression);
            (expression, evaluated)
        })
        .await?;

        Ok(match evaluated {
            Ok(value) => value.into(),
            Err(err) => {
                warn!(
                    event = "CALCULATION_ERROR",
                    expression = %sanitize_log_message(&expression),
                    error = %err,
                    "Expression evaluation failed"
                );
                DomainFailure::InvalidExpression.into()
            }
        })
    }

    async fn calculate_fibonacci(&self, input: &str) -> Result<CalcOutcome, EngineError> {
        let Some(n) = parse_integer(input) else {
            return Ok(DomainFailure::InvalidInput.into());
        };

        let ceiling = self.limits.fibonacci_ceiling;
        if n > BigInt::from(ceiling) {
            return Ok(DomainFailure::ExceedsCeiling(ceiling).into());
        }

        // Below the ceiling n always fits; n <= 1 is returned verbatim
        let n = match n.to_i64() {
            Some(n) if n > 1 => n,
            _ => return Ok(CalcValue::Integer(n).into()),
        };

        if n > SLOW_FIBONACCI_N {
            info!(n, "Computing Fibonacci by naive recursion");
        }

        let value = tokio::task::spawn_blocking(move || sequences::fibonacci(n)).await?;
        Ok(CalcValue::from(value).into())
    }

    async fn calculate_factorial(&self, input: &str) -> Result<CalcOutcome, EngineError> {
        let Some(n) = parse_integer(input) else {
            return Ok(DomainFailure::InvalidInput.into());
        };

        if n < BigInt::from(0) {
            return Ok(DomainFailure::NegativeNumber.into());
        }

        let ceiling = self.limits.factorial_ceiling;
        let n = match n.to_u64() {
            Some(n) if n <= u64::from(ceiling) => n,
            _ => return Ok(DomainFailure::ExceedsCeiling(ceiling).into()),
        };

        let value = tokio::task::spawn_blocking(move || sequences::factorial(n)).await?;
        Ok(CalcValue::Integer(value).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CalculationEngine {
        CalculationEngine::new(CacheStore::new(), EngineLimits::default())
    }

    fn int(n: i64) -> CalcOutcome {
        CalcOutcome::Value(CalcValue::from(n))
    }

    struct FailingEvaluator;

    impl ExpressionEvaluator for FailingEvaluator {
        fn evaluate(&self, _expression: &str) -> Result<CalcValue, EvalError> {
            Err(EvalError::Empty)
        }
    }

    struct PanickingEvaluator;

    impl ExpressionEvaluator for PanickingEvaluator {
        fn evaluate(&self, _expression: &str) -> Result<CalcValue, EvalError> {
            panic!("evaluator crashed")
        }
    }

    #[tokio::test]
    async fn test_evaluator_panic_is_a_worker_error() {
        let engine = CalculationEngine::with_evaluator(
            CacheStore::new(),
            Arc::new(PanickingEvaluator),
            EngineLimits::default(),
        );

        let err = engine.evaluate(OperationType::Calculator, "2 + 2").await.unwrap_err();
        assert!(matches!(err, EngineError::Worker(_)));
        assert_eq!(engine.cache().stats().await.cache_sizes.calculator, 0);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_logged_expressions_are_sanitized() {
        let engine = engine();
        let outcome = engine.compute(OperationType::Calculator, "token=abc123").await.unwrap();

        assert_eq!(outcome.to_string(), "Invalid expression");
        assert!(logs_contain("token=[REDACTED]"));
        assert!(!logs_contain("abc123"));
    }

    #[tokio::test]
    async fn test_calculator_results() {
        let engine = engine();
        assert_eq!(engine.compute(OperationType::Calculator, "2 + 2").await.unwrap(), int(4));
        assert_eq!(
            engine.compute(OperationType::Calculator, "7 / 2").await.unwrap(),
            CalcOutcome::Value(CalcValue::Float(3.5))
        );
        assert_eq!(
            engine.compute(OperationType::Calculator, "1 / 0").await.unwrap(),
            CalcOutcome::Failure(DomainFailure::InvalidExpression)
        );
    }

    #[tokio::test]
    async fn test_evaluator_is_pluggable() {
        let engine = CalculationEngine::with_evaluator(
            CacheStore::new(),
            Arc::new(FailingEvaluator),
            EngineLimits::default(),
        );
        let outcome = engine.compute(OperationType::Calculator, "2 + 2").await.unwrap();
        assert_eq!(outcome.to_string(), "Invalid expression");
    }

    #[tokio::test]
    async fn test_fibonacci_results() {
        let engine = engine();
        for (input, expected) in [("0", 0), ("1", 1), ("10", 55), ("20", 6765), (" 7 ", 13)] {
            assert_eq!(engine.compute(OperationType::Fibonacci, input).await.unwrap(), int(expected));
        }
        assert_eq!(engine.compute(OperationType::Fibonacci, "-4").await.unwrap(), int(-4));
        assert_eq!(
            engine.compute(OperationType::Fibonacci, "ten").await.unwrap().to_string(),
            "Invalid input"
        );
    }

    #[tokio::test]
    async fn test_fibonacci_ceiling() {
        let limits = EngineLimits {
            fibonacci_ceiling: 15,
            ..EngineLimits::default()
        };
        let engine = CalculationEngine::new(CacheStore::new(), limits);

        assert_eq!(engine.compute(OperationType::Fibonacci, "15").await.unwrap(), int(610));
        assert_eq!(
            engine.compute(OperationType::Fibonacci, "16").await.unwrap(),
            CalcOutcome::Failure(DomainFailure::ExceedsCeiling(15))
        );
        assert_eq!(
            engine
                .compute(OperationType::Fibonacci, "100000000000000000000000")
                .await
                .unwrap(),
            CalcOutcome::Failure(DomainFailure::ExceedsCeiling(15))
        );
    }

    #[tokio::test]
    async fn test_factorial_results() {
        let engine = engine();
        for (input, expected) in [("0", 1), ("5", 120), ("10", 3_628_800)] {
            assert_eq!(engine.compute(OperationType::Factorial, input).await.unwrap(), int(expected));
        }
        assert_eq!(
            engine.compute(OperationType::Factorial, "-3").await.unwrap().to_string(),
            "Error: negative number"
        );
        assert_eq!(
            engine.compute(OperationType::Factorial, "5.5").await.unwrap().to_string(),
            "Invalid input"
        );

        let big = engine.compute(OperationType::Factorial, "25").await.unwrap();
        assert_eq!(big.to_string(), "15511210043330985984000000");
    }

    #[tokio::test]
    async fn test_factorial_ceiling() {
        let limits = EngineLimits {
            factorial_ceiling: 10,
            ..EngineLimits::default()
        };
        let engine = CalculationEngine::new(CacheStore::new(), limits);

        assert_eq!(engine.compute(OperationType::Factorial, "10").await.unwrap(), int(3_628_800));
        assert_eq!(
            engine.compute(OperationType::Factorial, "11").await.unwrap().to_string(),
            "Error: input exceeds limit of 10"
        );
    }

    #[tokio::test]
    async fn test_second_evaluation_is_cached() {
        let engine = engine();

        let first = engine.evaluate(OperationType::Calculator, "2 + 2").await.unwrap();
        assert!(!first.cached);
        assert!(first.calculation_time.is_some());

        let second = engine.evaluate(OperationType::Calculator, "  2 + 2 ").await.unwrap();
        assert!(second.cached);
        assert_eq!(second.outcome, first.outcome);
        assert!(second.calculation_time.is_none());

        let stats = engine.cache().stats().await;
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.cache_sizes.calculator, 1);
    }

    #[tokio::test]
    async fn test_integer_inputs_share_a_normalized_key() {
        let engine = engine();
        engine.evaluate(OperationType::Fibonacci, "10").await.unwrap();

        let again = engine.evaluate(OperationType::Fibonacci, "+10").await.unwrap();
        assert!(again.cached);
        assert_eq!(again.cache_key, "10");
    }

    #[tokio::test]
    async fn test_input_failures_are_not_cached() {
        let engine = engine();
        engine.evaluate(OperationType::Calculator, "2 +").await.unwrap();
        engine.evaluate(OperationType::Fibonacci, "abc").await.unwrap();

        let stats = engine.cache().stats().await;
        assert_eq!(stats.cache_sizes.calculator, 0);
        assert_eq!(stats.cache_sizes.fibonacci, 0);
    }

    #[tokio::test]
    async fn test_negative_factorial_is_cached() {
        let engine = engine();
        engine.evaluate(OperationType::Factorial, "-3").await.unwrap();

        let again = engine.evaluate(OperationType::Factorial, "-3").await.unwrap();
        assert!(again.cached);
        assert_eq!(again.outcome.to_string(), "Error: negative number");
    }

    #[tokio::test]
    async fn test_recompute_after_clear_matches() {
        let engine = engine();
        let before = engine.evaluate(OperationType::Factorial, "12").await.unwrap();
        engine.cache().clear(Some(OperationType::Factorial)).await;
        let after = engine.evaluate(OperationType::Factorial, "12").await.unwrap();

        assert!(!after.cached);
        assert_eq!(before.outcome, after.outcome);
    }
}
