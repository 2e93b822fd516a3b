use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::benefit::LinkedAccountId;
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transaction as delivered by the banking-aggregation sync. Owned and
/// persisted by the sync collaborator; this subsystem only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedTransaction {
    pub id: TransactionId,
    pub account_id: LinkedAccountId,
    pub name: String,
    pub merchant_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub amount: Money,
    pub date: NaiveDate,
}

impl SyncedTransaction {
    /// The merchant name when the aggregator supplies one, else the display
    /// name.
    pub fn display_name(&self) -> &str {
        self.merchant_name.as_deref().unwrap_or(&self.name)
    }

    /// Negative amounts are credits/refunds; only these qualify for benefit
    /// matching.
    pub fn is_credit(&self) -> bool {
        self.amount.is_negative()
    }

    pub fn abs_amount(&self) -> Money {
        self.amount.abs()
    }
}
