use chrono::NaiveDate;
use perkledger_core::{CardBenefit, LinkedAccountId, Money};
use perkledger_storage as storage;
use sqlx::SqliteConnection;

use crate::EngineError;

/// Accumulates one matched credit against the benefit's ledger row for the
/// accounting period enclosing `date`.
///
/// The period comes from the benefit's cadence; the write is a single atomic
/// increment-or-create, so the row's `used` amount ends up as exactly the sum
/// of every matched credit in the period regardless of processing order.
pub async fn record_usage(
    conn: &mut SqliteConnection,
    benefit: &CardBenefit,
    account_id: LinkedAccountId,
    date: NaiveDate,
    amount: Money,
) -> Result<(), EngineError> {
    let period = benefit.timing.period_for(date);
    storage::accrue_usage(
        conn,
        benefit.id,
        account_id,
        period,
        amount.abs().to_cents(),
        benefit.max_amount.map(Money::to_cents),
    )
    .await?;
    Ok(())
}
