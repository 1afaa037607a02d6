//! Structured logging: subscriber setup, per-request trace ids and
//! redaction of sensitive values before they reach log output

pub mod sanitization;
pub mod subscriber;
pub mod trace;

pub use sanitization::*;
pub use subscriber::*;
pub use trace::*;
