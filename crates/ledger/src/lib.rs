//! Credit ledger persistence for Powergate.
//!
//! One SQLite database holds user accounts, the managed model catalogue,
//! and the append-only power ledger. The store implements the
//! `CreditLedger` and `ModelStore` traits from `powergate-core`.

pub mod store;

pub use store::SqliteStore;
