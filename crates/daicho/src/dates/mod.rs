//! Era-aware resolution of printed date strings to Gregorian dates.

pub mod era;
pub mod resolver;

pub use era::Era;
pub use resolver::DateResolver;
