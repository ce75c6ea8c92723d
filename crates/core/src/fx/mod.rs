//! FX resolution and rate snapshots.
//!
//! Resolution is a pure function over candidate quotes; storage loads the
//! candidates for the lookup window and hands them in.

pub mod error;
pub mod resolver;

#[cfg(test)]
mod resolver_props;

pub use error::FxError;
pub use resolver::{FxPolicy, FxProvenance, FxResolver, FxSnapshot, RateQuote};
