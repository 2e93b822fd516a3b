use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::period::BenefitCadence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenefitId(pub i64);

impl fmt::Display for BenefitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardProductId(pub i64);

impl fmt::Display for CardProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bank or card account associated with a card product. The linkage itself
/// is owned by account management; this subsystem only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedAccountId(pub i64);

impl fmt::Display for LinkedAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional absolute-amount bounds a transaction must satisfy beyond the
/// keyword match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitRule {
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
}

impl BenefitRule {
    /// True when `amount` (already an absolute value) falls inside the
    /// configured bounds.
    pub fn admits(&self, amount: Money) -> bool {
        if let Some(min) = self.min_amount {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if amount > max {
                return false;
            }
        }
        true
    }
}

/// A recurring perk tied to a card product.
///
/// `max_amount` is the per-period cap. `None` means uncapped, which is
/// distinct from a cap of zero dollars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardBenefit {
    pub id: BenefitId,
    pub product_id: CardProductId,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub timing: BenefitCadence,
    pub max_amount: Option<Money>,
    pub keywords: Vec<String>,
    pub rule: Option<BenefitRule>,
    pub active: bool,
}
