//! Arithmetic expression evaluation
//!
//! The engine only depends on [`ExpressionEvaluator`]; [`ArithmeticEvaluator`]
//! is the implementation wired in by default. It understands integer and
//! float literals, `+ - * / // % **`, unary signs and parentheses, with the
//! numeric rules of a typical scripting calculator:
//!
//! - `/` always produces a float, `//` floors toward negative infinity
//! - `%` takes the sign of the divisor
//! - `**` is right-associative and binds tighter than a leading minus
//!   (`-2 ** 2 == -4`); a negative integer exponent produces a float
//!
//! Integers are arbitrary precision up to [`MAX_INTEGER_BITS`]; larger results,
//! division by zero and non-finite float results are reported as errors
//! rather than wrapped or saturated.

use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};
use thiserror::Error;

use crate::schema::CalcValue;

/// Maximum nesting of parentheses and unary operators
const MAX_DEPTH: usize = 256;

/// Largest integer magnitude, in bits, an expression may produce
pub const MAX_INTEGER_BITS: u64 = 65_536;

/// Longest integer literal accepted, about `MAX_INTEGER_BITS` in decimal
const MAX_INTEGER_DIGITS: usize = 19_728;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Empty expression")]
    Empty,

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("Unexpected token at position {0}")]
    UnexpectedToken(usize),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow")]
    Overflow,

    #[error("Result is not a finite number")]
    NonFinite,

    #[error("Expression nested too deeply")]
    TooDeep,
}

/// Opaque evaluator used by the calculator operation
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str) -> Result<CalcValue, EvalError>;
}

/// Recursive-descent evaluator for plain arithmetic
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticEvaluator;

impl ExpressionEvaluator for ArithmeticEvaluator {
    fn evaluate(&self, expression: &str) -> Result<CalcValue, EvalError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(EvalError::Empty);
        }

        let mut parser = Parser { tokens, pos: 0, depth: 0 };
        let number = parser.expression()?;
        if let Some((_, position)) = parser.tokens.get(parser.pos) {
            return Err(EvalError::UnexpectedToken(*position));
        }

        Ok(match number {
            Number::Int(n) => CalcValue::Integer(n),
            Number::Float(x) => CalcValue::Float(x),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Number {
    Int(BigInt),
    Float(f64),
}

impl Number {
    /// Integers too large for an f64 cannot join float arithmetic
    fn as_f64(&self) -> Result<f64, EvalError> {
        match self {
            Number::Int(n) => n
                .to_f64()
                .filter(|x| x.is_finite())
                .ok_or(EvalError::NonFinite),
            Number::Float(x) => Ok(*x),
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Number::Int(n) => n.is_zero(),
            Number::Float(x) => *x == 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, EvalError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let (number, next) = lex_number(&chars, i)?;
                i = next;
                tokens.push((Token::Num(number), start));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::DoubleStar
            }
            '*' => Token::Star,
            '/' if chars.get(i + 1) == Some(&'/') => {
                i += 1;
                Token::DoubleSlash
            }
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(EvalError::UnexpectedChar(other, i)),
        };
        i += 1;
        tokens.push((token, start));
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Number, usize), EvalError> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let literal: String = chars[start..i].iter().collect();
    if literal == "." {
        return Err(EvalError::InvalidNumber(literal));
    }

    let number = if is_float {
        let value = literal
            .parse::<f64>()
            .map_err(|_| EvalError::InvalidNumber(literal.clone()))?;
        Number::Float(finite(value)?)
    } else {
        if literal.trim_start_matches('0').len() > MAX_INTEGER_DIGITS {
            return Err(EvalError::Overflow);
        }
        let value = literal
            .parse::<BigInt>()
            .map_err(|_| EvalError::InvalidNumber(literal.clone()))?;
        Number::Int(bounded(value)?)
    };

    Ok((number, i))
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        Ok(())
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Number, EvalError> {
        let mut left = self.term()?;
        while let Some(Token::Plus | Token::Minus) = self.peek() {
            let Some((op, _)) = self.advance() else { break };
            let right = self.term()?;
            left = match op {
                Token::Plus => add(left, right)?,
                _ => subtract(left, right)?,
            };
        }
        Ok(left)
    }

    // term := unary (('*' | '/' | '//' | '%') unary)*
    fn term(&mut self) -> Result<Number, EvalError> {
        let mut left = self.unary()?;
        while let Some(Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent) = self.peek() {
            let Some((op, _)) = self.advance() else { break };
            let right = self.unary()?;
            left = match op {
                Token::Star => multiply(left, right)?,
                Token::Slash => divide(left, right)?,
                Token::DoubleSlash => floor_divide(left, right)?,
                _ => modulo(left, right)?,
            };
        }
        Ok(left)
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Result<Number, EvalError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.advance();
                self.descend()?;
                let value = self.unary();
                self.depth -= 1;
                value
            }
            Some(Token::Minus) => {
                self.advance();
                self.descend()?;
                let value = self.unary().map(negate);
                self.depth -= 1;
                value
            }
            _ => self.power(),
        }
    }

    // power := atom ('**' unary)?
    fn power(&mut self) -> Result<Number, EvalError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::DoubleStar) {
            self.advance();
            self.descend()?;
            let exponent = self.unary();
            self.depth -= 1;
            return pow(base, exponent?);
        }
        Ok(base)
    }

    // atom := number | '(' expression ')'
    fn atom(&mut self) -> Result<Number, EvalError> {
        match self.advance() {
            Some((Token::Num(number), _)) => Ok(number),
            Some((Token::LParen, _)) => {
                self.descend()?;
                let value = self.expression()?;
                self.depth -= 1;
                match self.advance() {
                    Some((Token::RParen, _)) => Ok(value),
                    Some((_, position)) => Err(EvalError::UnexpectedToken(position)),
                    None => Err(EvalError::UnexpectedEnd),
                }
            }
            Some((_, position)) => Err(EvalError::UnexpectedToken(position)),
            None => Err(EvalError::UnexpectedEnd),
        }
    }
}

fn finite(value: f64) -> Result<f64, EvalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

fn float(value: f64) -> Result<Number, EvalError> {
    finite(value).map(Number::Float)
}

fn bounded(value: BigInt) -> Result<BigInt, EvalError> {
    if value.bits() > MAX_INTEGER_BITS {
        Err(EvalError::Overflow)
    } else {
        Ok(value)
    }
}

fn int(value: BigInt) -> Result<Number, EvalError> {
    bounded(value).map(Number::Int)
}

fn add(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int(x + y),
        (a, b) => float(a.as_f64()? + b.as_f64()?),
    }
}

fn subtract(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int(x - y),
        (a, b) => float(a.as_f64()? - b.as_f64()?),
    }
}

fn multiply(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            if x.bits() + y.bits() > MAX_INTEGER_BITS + 1 {
                return Err(EvalError::Overflow);
            }
            int(x * y)
        }
        (a, b) => float(a.as_f64()? * b.as_f64()?),
    }
}

fn divide(a: Number, b: Number) -> Result<Number, EvalError> {
    if b.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    float(a.as_f64()? / b.as_f64()?)
}

/// Quotient and remainder rounded toward negative infinity
fn floor_div_rem(x: &BigInt, y: &BigInt) -> (BigInt, BigInt) {
    let quotient = x / y;
    let remainder = x % y;
    if !remainder.is_zero() && remainder.is_negative() != y.is_negative() {
        (quotient - BigInt::one(), remainder + y)
    } else {
        (quotient, remainder)
    }
}

fn floor_divide(a: Number, b: Number) -> Result<Number, EvalError> {
    if b.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int(floor_div_rem(&x, &y).0),
        (a, b) => float((a.as_f64()? / b.as_f64()?).floor()),
    }
}

fn modulo(a: Number, b: Number) -> Result<Number, EvalError> {
    if b.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int(floor_div_rem(&x, &y).1),
        (a, b) => {
            let (x, y) = (a.as_f64()?, b.as_f64()?);
            let remainder = x % y;
            if remainder != 0.0 && ((remainder < 0.0) != (y < 0.0)) {
                float(remainder + y)
            } else {
                float(remainder)
            }
        }
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, EvalError> {
    match (base, exponent) {
        (Number::Int(x), Number::Int(e)) if e.sign() != Sign::Minus => int_pow(x, &e),
        (base, exponent) => {
            if base.is_zero() && exponent.as_f64()? < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            float(base.as_f64()?.powf(exponent.as_f64()?))
        }
    }
}

fn int_pow(base: BigInt, exponent: &BigInt) -> Result<Number, EvalError> {
    // 0, 1 and -1 stay small for any exponent
    if base.bits() <= 1 {
        let result = if exponent.is_zero() {
            BigInt::one()
        } else if base.is_negative() && exponent.bit(0) {
            -BigInt::one()
        } else {
            base.abs()
        };
        return int(result);
    }

    let exponent = exponent.to_u32().ok_or(EvalError::Overflow)?;
    // |base| >= 2^(bits - 1), so the result has at least this many bits
    if (base.bits() - 1).saturating_mul(u64::from(exponent)) >= MAX_INTEGER_BITS {
        return Err(EvalError::Overflow);
    }
    int(base.pow(exponent))
}

fn negate(value: Number) -> Number {
    match value {
        Number::Int(n) => Number::Int(-n),
        Number::Float(x) => Number::Float(-x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str) -> Result<CalcValue, EvalError> {
        ArithmeticEvaluator.evaluate(expression)
    }

    fn int(n: i64) -> CalcValue {
        CalcValue::from(n)
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(eval("2 + 2").unwrap(), int(4));
        assert_eq!(eval("2 + 3 * 4").unwrap(), int(14));
        assert_eq!(eval("(2 + 3) * 4").unwrap(), int(20));
        assert_eq!(eval("10 - 4 - 3").unwrap(), int(3));
        assert_eq!(eval("  7  ").unwrap(), int(7));
    }

    #[test]
    fn test_true_division_yields_float() {
        assert_eq!(eval("7 / 2").unwrap(), CalcValue::Float(3.5));
        assert_eq!(eval("4 / 2").unwrap(), CalcValue::Float(2.0));
        assert_eq!(eval("4 / 2").unwrap().to_string(), "2.0");
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(eval("7 // 2").unwrap(), int(3));
        assert_eq!(eval("-7 // 2").unwrap(), int(-4));
        assert_eq!(eval("7 % 3").unwrap(), int(1));
        assert_eq!(eval("-7 % 3").unwrap(), int(2));
        assert_eq!(eval("7 % -3").unwrap(), int(-2));
        assert_eq!(eval("7.5 // 2").unwrap(), CalcValue::Float(3.0));
    }

    #[test]
    fn test_power_precedence_and_associativity() {
        assert_eq!(eval("2 ** 10").unwrap(), int(1024));
        assert_eq!(eval("-2 ** 2").unwrap(), int(-4));
        assert_eq!(eval("(-2) ** 2").unwrap(), int(4));
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), int(512));
        assert_eq!(eval("2 ** -1").unwrap(), CalcValue::Float(0.5));
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(eval("1.5 + 1").unwrap(), CalcValue::Float(2.5));
        assert_eq!(eval(".5 * 4").unwrap(), CalcValue::Float(2.0));
        assert_eq!(eval("1e3").unwrap(), CalcValue::Float(1000.0));
        assert_eq!(eval("2.5E-1").unwrap(), CalcValue::Float(0.25));
    }

    #[test]
    fn test_unary_signs() {
        assert_eq!(eval("-3 + 5").unwrap(), int(2));
        assert_eq!(eval("+3").unwrap(), int(3));
        assert_eq!(eval("--3").unwrap(), int(3));
        assert_eq!(eval("4 * -2").unwrap(), int(-8));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 // 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("0 ** -1"), Err(EvalError::DivisionByZero));
    }

    fn big(digits: &str) -> CalcValue {
        CalcValue::Integer(digits.parse().unwrap())
    }

    #[test]
    fn test_integers_are_unbounded() {
        assert_eq!(eval("2 ** 64").unwrap(), big("18446744073709551616"));
        assert_eq!(
            eval("99999999999 * 99999999999").unwrap(),
            big("9999999999800000000001")
        );
        assert_eq!(eval("9223372036854775807 + 1").unwrap(), big("9223372036854775808"));
        assert_eq!(eval("-(2 ** 63) // -1").unwrap(), big("9223372036854775808"));
        assert_eq!(eval("-(2 ** 70) // 3").unwrap(), big("-393530540239137101142"));
        assert_eq!(eval("-(2 ** 70) % 3").unwrap(), int(2));
        assert_eq!(eval("99999999999999999999").unwrap(), big("99999999999999999999"));
        assert_eq!(eval("(-1) ** 100001").unwrap(), int(-1));
        assert_eq!(eval("1 ** 99999999999999999999").unwrap(), int(1));
    }

    #[test]
    fn test_size_limits_and_non_finite_are_errors() {
        assert!(eval("2 ** 65535").is_ok());
        assert_eq!(eval("2 ** 65536"), Err(EvalError::Overflow));
        assert_eq!(eval("10 ** 10 ** 10"), Err(EvalError::Overflow));
        assert_eq!(eval(&"9".repeat(MAX_INTEGER_DIGITS + 1)), Err(EvalError::Overflow));
        assert_eq!(eval("10 ** 400 * 1.0"), Err(EvalError::NonFinite));
        assert_eq!(eval("10.0 ** 400"), Err(EvalError::NonFinite));
        assert_eq!(eval("(-8) ** 0.5"), Err(EvalError::NonFinite));
    }

    #[test]
    fn test_malformed_expressions() {
        assert_eq!(eval(""), Err(EvalError::Empty));
        assert_eq!(eval("   "), Err(EvalError::Empty));
        assert_eq!(eval("2 +"), Err(EvalError::UnexpectedEnd));
        assert_eq!(eval("(2 + 3"), Err(EvalError::UnexpectedEnd));
        assert_eq!(eval("2 3"), Err(EvalError::UnexpectedToken(2)));
        assert_eq!(eval("2 + 3)"), Err(EvalError::UnexpectedToken(5)));
        assert_eq!(eval("abc"), Err(EvalError::UnexpectedChar('a', 0)));
        assert_eq!(eval("."), Err(EvalError::InvalidNumber(".".to_string())));
        assert!(eval("__import__('os')").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(eval(&deep), Err(EvalError::TooDeep));

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(eval(&shallow).unwrap(), int(1));
    }
}
