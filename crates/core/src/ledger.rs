//! Credit ledger domain types and persistence traits.
//!
//! The ledger is the single source of truth for user balances. Every
//! balance change is recorded as an append-only `LedgerEntry`; for any
//! user, replaying `change` over the entries must reproduce the live
//! balance. Implementations must serialize debit/credit per user so
//! concurrent requests cannot produce lost updates.

use crate::error::{LedgerError, StoreError};
use crate::model::ModelConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account as seen by the metering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    /// Current credit balance. Non-negative for regular users.
    pub power_balance: i64,
    /// Admins bypass balance checks entirely.
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Why a balance changed. Stored as a stable string in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Account creation grant.
    Init,
    /// Pre-flight debit for a chat request.
    Chat,
    /// Refund after a non-streaming upstream failure (HTTP or transport).
    RefundError,
    /// Refund after a header-level streaming failure (no body yet).
    RefundStreamStart,
    /// Refund after a stream crash before any content line arrived.
    RefundStreamCrash,
    /// Recharge-code redemption.
    Recharge,
    /// Manual administrative adjustment.
    AdminAdjust,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::Init => "init",
            LedgerReason::Chat => "chat",
            LedgerReason::RefundError => "refund_error",
            LedgerReason::RefundStreamStart => "refund_stream_start",
            LedgerReason::RefundStreamCrash => "refund_stream_crash",
            LedgerReason::Recharge => "recharge",
            LedgerReason::AdminAdjust => "admin_adjust",
        }
    }

    /// Parse a stored reason string. Unknown strings are an error — the
    /// ledger is append-only, so every stored value must round-trip.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "init" => Some(Self::Init),
            "chat" => Some(Self::Chat),
            "refund_error" => Some(Self::RefundError),
            "refund_stream_start" => Some(Self::RefundStreamStart),
            "refund_stream_crash" => Some(Self::RefundStreamCrash),
            "recharge" => Some(Self::Recharge),
            "admin_adjust" => Some(Self::AdminAdjust),
            _ => None,
        }
    }
}

/// One immutable audit record of a balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    /// Signed delta applied to the balance.
    pub change: i64,
    /// The balance immediately after this entry was committed.
    pub balance_after: i64,
    pub reason: LedgerReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Atomic balance operations. All methods must be linearizable per user.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Debit `amount` from the user's balance.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` (no mutation, no entry)
    /// when the balance is insufficient. Admin users always succeed
    /// without balance mutation or ledger entry.
    async fn debit(
        &self,
        user_id: i64,
        amount: i64,
        reason: LedgerReason,
        model_id: Option<i64>,
    ) -> Result<bool, LedgerError>;

    /// Credit `amount` to the user's balance. Always succeeds for an
    /// existing user; returns the new balance.
    async fn credit(
        &self,
        user_id: i64,
        amount: i64,
        reason: LedgerReason,
        request_id: Option<&str>,
    ) -> Result<i64, LedgerError>;

    /// Current balance.
    async fn balance_of(&self, user_id: i64) -> Result<i64, LedgerError>;

    /// The user account, if it exists.
    async fn get_user(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError>;

    /// Append-only audit read, in entry order.
    async fn list_entries(&self, user_id: i64) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// Read-only access to the managed model catalogue.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn get_model_by_id(&self, id: i64) -> Result<Option<ModelConfig>, StoreError>;

    /// All enabled models. Callers are responsible for stripping secrets
    /// before exposing the result.
    async fn list_enabled(&self) -> Result<Vec<ModelConfig>, StoreError>;
}
