//! # Powergate Core
//!
//! Domain types, traits, and error definitions for the Powergate metered
//! LLM proxy. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The persistence seams (`CreditLedger`, `ModelStore`) are defined as
//! traits here. Implementations live in their respective crates. This
//! enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod frame;
pub mod ledger;
pub mod message;
pub mod model;

// Re-export key types at crate root for ergonomics
pub use error::{Error, LedgerError, ProxyError, Result, StoreError};
pub use frame::ContextFrame;
pub use ledger::{CreditLedger, LedgerEntry, LedgerReason, ModelStore, UserAccount};
pub use message::{ChatRequest, Message, Role, WireMessage};
pub use model::ModelConfig;
