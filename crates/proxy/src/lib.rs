//! The metered chat proxy.
//!
//! Wraps one upstream chat-completion call in the credit lifecycle:
//! resolve model → debit → build context → dispatch → reconcile.
//! The streaming path is guarded so that exactly one refund can fire
//! per request, decided by how much of the upstream response was
//! observed.

pub mod metered;
pub mod upstream;

pub use metered::{ChatOutcome, MeteredProxy};
pub use upstream::UpstreamClient;
