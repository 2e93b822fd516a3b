pub mod ledger;
pub mod recorder;
pub mod scanner;

pub use recorder::link_transaction_to_benefit;
pub use scanner::{
    handle_synced_transaction, match_transaction_to_benefits, scan_and_match_benefits,
    ScanSummary, DEFAULT_SCAN_CAP,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] perkledger_storage::StorageError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
