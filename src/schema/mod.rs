pub mod operation;
pub mod outcome;

pub use operation::*;
pub use outcome::*;
