//! Common types used across the application.

pub mod id;
pub mod money;
pub mod scope;

pub use id::*;
pub use money::CurrencyCode;
pub use scope::RequestScope;
