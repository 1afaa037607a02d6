//! Role-based input gating
//!
//! Checked before the cache is consulted, so a denied request never reaches
//! the engine. Admins are never restricted; users are limited by the
//! thresholds in [`GatePolicy`]; anonymous callers are always refused.

use num_bigint::BigInt;

use super::permissions::{GateDecision, Role};
use crate::schema::{parse_integer, OperationType};

/// Thresholds and keywords applied to the `user` role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePolicy {
    /// Largest Fibonacci index a user may request
    pub fibonacci_user_max: u32,
    /// Largest factorial input a user may request
    pub factorial_user_max: u32,
    /// Substrings that make an expression admin-only, checked in order
    pub restricted_keywords: Vec<String>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            fibonacci_user_max: 29,
            factorial_user_max: 200,
            restricted_keywords: ["eval", "exec", "import", "__"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Decides whether a caller may run an operation on a given input
///
/// # Examples
///
/// ```rust
/// use calc_api::auth::gate::AuthorizationGate;
/// use calc_api::auth::permissions::Role;
/// use calc_api::schema::OperationType;
///
/// let gate = AuthorizationGate::default();
/// assert!(gate.check(Role::User, OperationType::Fibonacci, "29").allowed);
/// assert!(!gate.check(Role::User, OperationType::Fibonacci, "30").allowed);
/// assert!(gate.check(Role::Admin, OperationType::Fibonacci, "30").allowed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    policy: GatePolicy,
}

impl AuthorizationGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub fn check(&self, role: Role, operation: OperationType, input: &str) -> GateDecision {
        match role {
            Role::Anonymous => GateDecision::deny("Authentication required"),
            Role::Admin => GateDecision::allow("Admin access granted"),
            Role::User => self.check_user(operation, input),
        }
    }

    fn check_user(&self, operation: OperationType, input: &str) -> GateDecision {
        match operation {
            OperationType::Calculator => {
                let lowered = input.to_lowercase();
                if let Some(keyword) = self
                    .policy
                    .restricted_keywords
                    .iter()
                    .find(|keyword| lowered.contains(keyword.as_str()))
                {
                    return GateDecision::deny(format!(
                        "Expression contains restricted keyword '{}'. Admin access required.",
                        keyword
                    ));
                }
            }
            OperationType::Fibonacci => {
                if let Some(denial) =
                    threshold_check(operation, input, self.policy.fibonacci_user_max, "Fibonacci numbers")
                {
                    return denial;
                }
            }
            OperationType::Factorial => {
                if let Some(denial) =
                    threshold_check(operation, input, self.policy.factorial_user_max, "Factorial numbers")
                {
                    return denial;
                }
            }
        }

        GateDecision::allow("User access granted")
    }
}

fn threshold_check(
    operation: OperationType,
    input: &str,
    max: u32,
    subject: &str,
) -> Option<GateDecision> {
    match parse_integer(input) {
        None => Some(GateDecision::deny(format!("Invalid input for {}", operation))),
        Some(n) if n > BigInt::from(max) => Some(GateDecision::deny(format!(
            "{} above {} require admin access.",
            subject, max
        ))),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthorizationGate {
        AuthorizationGate::default()
    }

    #[test]
    fn test_anonymous_is_always_denied() {
        for op in OperationType::ALL {
            let decision = gate().check(Role::Anonymous, op, "1");
            assert!(!decision.allowed);
            assert_eq!(decision.reason, "Authentication required");
        }
    }

    #[test]
    fn test_admin_is_never_restricted() {
        let gate = gate();
        for (op, input) in [
            (OperationType::Calculator, "__import__('os')"),
            (OperationType::Fibonacci, "1000"),
            (OperationType::Factorial, "100000"),
            (OperationType::Fibonacci, "not a number"),
        ] {
            let decision = gate.check(Role::Admin, op, input);
            assert!(decision.allowed);
            assert_eq!(decision.reason, "Admin access granted");
        }
    }

    #[test]
    fn test_user_fibonacci_boundary() {
        let gate = gate();
        let at_limit = gate.check(Role::User, OperationType::Fibonacci, "29");
        assert!(at_limit.allowed);
        assert_eq!(at_limit.reason, "User access granted");

        let above = gate.check(Role::User, OperationType::Fibonacci, " 30 ");
        assert!(!above.allowed);
        assert_eq!(above.reason, "Fibonacci numbers above 29 require admin access.");
    }

    #[test]
    fn test_user_factorial_boundary() {
        let gate = gate();
        assert!(gate.check(Role::User, OperationType::Factorial, "200").allowed);

        let above = gate.check(Role::User, OperationType::Factorial, "201");
        assert!(!above.allowed);
        assert_eq!(above.reason, "Factorial numbers above 200 require admin access.");
    }

    #[test]
    fn test_user_negative_inputs_pass_the_gate() {
        let gate = gate();
        assert!(gate.check(Role::User, OperationType::Factorial, "-3").allowed);
        assert!(gate.check(Role::User, OperationType::Fibonacci, "-10").allowed);
    }

    #[test]
    fn test_user_unparsable_integer_input() {
        let gate = gate();
        let fib = gate.check(Role::User, OperationType::Fibonacci, "abc");
        assert!(!fib.allowed);
        assert_eq!(fib.reason, "Invalid input for fibonacci");

        let fact = gate.check(Role::User, OperationType::Factorial, "1.5");
        assert_eq!(fact.reason, "Invalid input for factorial");
    }

    #[test]
    fn test_user_restricted_keywords_are_case_insensitive() {
        let gate = gate();
        let decision = gate.check(Role::User, OperationType::Calculator, "EVAL(1)");
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason,
            "Expression contains restricted keyword 'eval'. Admin access required."
        );

        let dunder = gate.check(Role::User, OperationType::Calculator, "x.__class__");
        assert_eq!(
            dunder.reason,
            "Expression contains restricted keyword '__'. Admin access required."
        );
    }

    #[test]
    fn test_first_listed_keyword_is_reported() {
        let decision = gate().check(Role::User, OperationType::Calculator, "__import__");
        assert_eq!(
            decision.reason,
            "Expression contains restricted keyword 'import'. Admin access required."
        );
    }

    #[test]
    fn test_user_plain_expression_allowed() {
        let decision = gate().check(Role::User, OperationType::Calculator, "2 + 2");
        assert!(decision.allowed);
        assert_eq!(decision.reason, "User access granted");
    }

    #[test]
    fn test_custom_policy_thresholds() {
        let gate = AuthorizationGate::new(GatePolicy {
            fibonacci_user_max: 10,
            factorial_user_max: 20,
            restricted_keywords: vec!["pow".to_string()],
        });

        assert!(!gate.check(Role::User, OperationType::Fibonacci, "11").allowed);
        assert_eq!(
            gate.check(Role::User, OperationType::Factorial, "21").reason,
            "Factorial numbers above 20 require admin access."
        );
        assert!(gate.check(Role::User, OperationType::Calculator, "eval").allowed);
        assert!(!gate.check(Role::User, OperationType::Calculator, "POW(2)").allowed);
    }
}
