pub mod benefit;
pub mod money;
pub mod period;
pub mod transaction;

pub use benefit::{BenefitId, BenefitRule, CardBenefit, CardProductId, LinkedAccountId};
pub use money::Money;
pub use period::{BenefitCadence, DateRange};
pub use transaction::{SyncedTransaction, TransactionId};
