//! Shared types, errors, and configuration for Defter.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Currency codes and the request scope carried by every mutation
//! - The application-wide error taxonomy
//! - Configuration management and JWT claims

pub mod auth;
pub mod config;
pub mod error;
pub mod jwt;
pub mod types;

pub use auth::{Claims, ScopeAccess, ScopeAction};
pub use config::{AppConfig, FxFallbackPolicy, PostingConfig};
pub use error::{AppError, AppResult, ErrorKind};
pub use jwt::{JwtError, JwtService};
