use perkledger_core::{CardBenefit, SyncedTransaction};
use perkledger_storage as storage;
use perkledger_storage::{DbPool, TransactionExt};

use crate::ledger;
use crate::EngineError;

/// Records the transaction-to-benefit link and accrues the ledger as one
/// database transaction.
///
/// The link half is idempotent (the annotation row is upserted by transaction
/// id), but the ledger half increments. Callers must submit each transaction
/// at most once: the backfill selection only picks transactions that have
/// never been linked, which is what keeps a re-run from double-counting.
pub async fn link_transaction_to_benefit(
    pool: &DbPool,
    tx: &SyncedTransaction,
    benefit: &CardBenefit,
    reason: &str,
) -> Result<TransactionExt, EngineError> {
    let mut db_tx = pool.begin().await?;
    let link = storage::upsert_transaction_ext(&mut db_tx, tx.id, Some(benefit.id), reason).await?;
    ledger::record_usage(&mut db_tx, benefit, tx.account_id, tx.date, tx.abs_amount()).await?;
    db_tx.commit().await?;
    Ok(link)
}
