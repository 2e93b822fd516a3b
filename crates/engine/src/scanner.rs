use perkledger_core::{LinkedAccountId, SyncedTransaction};
use perkledger_match::{select_matches, BenefitCatalog, BenefitMatch};
use perkledger_storage as storage;
use perkledger_storage::DbPool;

use crate::recorder::link_transaction_to_benefit;
use crate::EngineError;

/// Per-run bound on the backfill candidate set, to keep worst-case batch
/// latency predictable.
pub const DEFAULT_SCAN_CAP: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    /// Transactions linked to a benefit during this run.
    pub matched: u32,
    /// Transactions selected for evaluation, including ones that failed and
    /// will be retried next run.
    pub checked: u32,
}

/// Evaluates one transaction against the benefits of its account's card
/// product.
///
/// Returns `Ok(None)` for ineligible input — a non-credit amount, or an
/// account with no linked card product. `Ok(Some(matches))` otherwise, every
/// hit in benefit definition order; callers treat index 0 as authoritative.
pub async fn match_transaction_to_benefits(
    pool: &DbPool,
    catalog: Option<&BenefitCatalog>,
    tx: &SyncedTransaction,
) -> Result<Option<Vec<BenefitMatch>>, EngineError> {
    if !tx.is_credit() {
        tracing::debug!(tx = %tx.id, "not a credit, skipping benefit match");
        return Ok(None);
    }

    let Some(benefits) = storage::benefits_for_account(pool, tx.account_id).await? else {
        tracing::debug!(account = %tx.account_id, "no card product linked");
        return Ok(None);
    };

    Ok(Some(select_matches(tx, &benefits, catalog)))
}

/// Real-time entry point, invoked once per newly-synced transaction.
///
/// Links the authoritative match when there is one; otherwise records the
/// checked-no-match annotation so the backfill never rescans this
/// transaction. Returns what `match_transaction_to_benefits` found.
pub async fn handle_synced_transaction(
    pool: &DbPool,
    catalog: Option<&BenefitCatalog>,
    tx: &SyncedTransaction,
) -> Result<Option<Vec<BenefitMatch>>, EngineError> {
    let matches = match_transaction_to_benefits(pool, catalog, tx).await?;

    match matches.as_ref().and_then(|m| m.first()) {
        Some(best) => {
            link_transaction_to_benefit(pool, tx, &best.benefit, &best.reason).await?;
        }
        None => {
            let mut conn = pool.acquire().await?;
            storage::mark_transaction_checked(&mut conn, tx.id).await?;
        }
    }

    Ok(matches)
}

/// Backfill over historical transactions with no match decision yet.
///
/// The candidate set is bounded to the given accounts (or all of the user's
/// accounts) and capped at `cap` rows. Candidates are processed one at a
/// time; a failure on one transaction is logged and skipped — that row keeps
/// its unscanned state and is picked up again on the next run. Only a failure
/// to obtain the candidate set at all propagates.
///
/// The returned summary is advisory: each row commits independently, so a
/// crash mid-run just shrinks the next run's selection.
pub async fn scan_and_match_benefits(
    pool: &DbPool,
    catalog: Option<&BenefitCatalog>,
    user_id: i64,
    accounts: Option<&[LinkedAccountId]>,
    cap: u32,
) -> Result<ScanSummary, EngineError> {
    let accounts: Vec<LinkedAccountId> = match accounts {
        Some(ids) => ids.to_vec(),
        None => storage::accounts_for_user(pool, user_id).await?,
    };

    let candidates = storage::unmatched_transactions(pool, &accounts, cap).await?;
    let mut summary = ScanSummary {
        matched: 0,
        checked: candidates.len() as u32,
    };

    for tx in &candidates {
        match process_candidate(pool, catalog, tx).await {
            Ok(true) => summary.matched += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(tx = %tx.id, error = %e, "benefit scan failed for transaction");
            }
        }
    }

    tracing::info!(
        user = user_id,
        matched = summary.matched,
        checked = summary.checked,
        "benefit backfill complete"
    );
    Ok(summary)
}

async fn process_candidate(
    pool: &DbPool,
    catalog: Option<&BenefitCatalog>,
    tx: &SyncedTransaction,
) -> Result<bool, EngineError> {
    match match_transaction_to_benefits(pool, catalog, tx)
        .await?
        .and_then(|m| m.into_iter().next())
    {
        Some(best) => {
            link_transaction_to_benefit(pool, tx, &best.benefit, &best.reason).await?;
            Ok(true)
        }
        None => {
            let mut conn = pool.acquire().await?;
            storage::mark_transaction_checked(&mut conn, tx.id).await?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, seed_rideshare_card, synced_tx, test_db};
    use perkledger_core::{BenefitCadence, Money};
    use perkledger_match::{CatalogRule, KEYWORD_MATCH_CONFIDENCE};
    use perkledger_storage::CHECKED_NO_MATCH_NOTE;

    #[tokio::test]
    async fn match_returns_none_for_purchases_and_unlinked_accounts() {
        let (_dir, pool) = test_db().await;
        let (_, _, account) = seed_rideshare_card(&pool, 1).await;

        // A $45.00 purchase at a matching merchant.
        let purchase = synced_tx(&pool, account, "UBER", None, 4_500, date(2024, 2, 2)).await;
        assert!(match_transaction_to_benefits(&pool, None, &purchase)
            .await
            .unwrap()
            .is_none());

        // A credit on an account with no card product.
        let plain = storage::insert_linked_account(&pool, 1, "Savings", None).await.unwrap();
        let credit = synced_tx(&pool, plain, "UBER", None, -4_500, date(2024, 2, 2)).await;
        assert!(match_transaction_to_benefits(&pool, None, &credit)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn match_returns_hits_in_definition_order() {
        let (_dir, pool) = test_db().await;
        let (_, benefit_id, account) = seed_rideshare_card(&pool, 1).await;

        let tx = synced_tx(&pool, account, "UBER EATS", None, -15_000, date(2024, 2, 2)).await;
        let matches = match_transaction_to_benefits(&pool, None, &tx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].benefit.id, benefit_id);
        assert_eq!(matches[0].confidence, KEYWORD_MATCH_CONFIDENCE);
    }

    #[tokio::test]
    async fn realtime_links_the_first_match() {
        let (_dir, pool) = test_db().await;
        let (_, benefit_id, account) = seed_rideshare_card(&pool, 1).await;

        let tx = synced_tx(&pool, account, "UBER EATS", None, -15_000, date(2024, 2, 2)).await;
        handle_synced_transaction(&pool, None, &tx).await.unwrap();

        let ext = storage::get_transaction_ext(&pool, tx.id).await.unwrap().unwrap();
        assert_eq!(ext.matched_benefit_id, Some(benefit_id));

        let usage = storage::usage_covering(&pool, benefit_id, account, tx.date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usage.used, Money::from_cents(15_000));
    }

    #[tokio::test]
    async fn realtime_marks_no_match_as_checked() {
        let (_dir, pool) = test_db().await;
        let (_, _, account) = seed_rideshare_card(&pool, 1).await;

        let tx = synced_tx(&pool, account, "STARBUCKS", None, -500, date(2024, 2, 2)).await;
        let matches = handle_synced_transaction(&pool, None, &tx).await.unwrap();
        assert_eq!(matches.map(|m| m.len()), Some(0));

        let ext = storage::get_transaction_ext(&pool, tx.id).await.unwrap().unwrap();
        assert_eq!(ext.matched_benefit_id, None);
        assert_eq!(ext.note, CHECKED_NO_MATCH_NOTE);

        // Terminal: the backfill never selects it again.
        let candidates = storage::unmatched_transactions(&pool, &[account], 100).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn backfill_tolerates_per_transaction_failures() {
        let (_dir, pool) = test_db().await;
        let (_, benefit_id, account_a) = seed_rideshare_card(&pool, 1).await;

        // A second card for the same user whose benefit row is poisoned so
        // every evaluation on that account errors.
        let product_b = storage::insert_card_product(&pool, "Broken Card", "Acme").await.unwrap();
        let poisoned = storage::insert_benefit(
            &pool,
            product_b,
            "Broken Benefit",
            "broken",
            "",
            BenefitCadence::Annually,
            None,
            &["anything"],
            None,
            None,
        )
        .await
        .unwrap();
        let account_b = storage::insert_linked_account(&pool, 1, "Broken", Some(product_b))
            .await
            .unwrap();
        sqlx::query("UPDATE card_benefits SET keywords = 'oops' WHERE id = ?")
            .bind(poisoned.0)
            .execute(&pool)
            .await
            .unwrap();

        let tx1 = synced_tx(&pool, account_a, "UBER EATS", None, -15_000, date(2024, 1, 2)).await;
        let tx2 = synced_tx(&pool, account_b, "LYFT", None, -5_000, date(2024, 1, 3)).await;
        let tx3 = synced_tx(&pool, account_a, "UBER", None, 4_500, date(2024, 1, 4)).await;

        let summary = scan_and_match_benefits(&pool, None, 1, None, DEFAULT_SCAN_CAP)
            .await
            .unwrap();
        assert_eq!(summary.checked, 3);
        assert_eq!(summary.matched, 1);

        // tx1 linked and accrued.
        let ext1 = storage::get_transaction_ext(&pool, tx1.id).await.unwrap().unwrap();
        assert_eq!(ext1.matched_benefit_id, Some(benefit_id));
        assert!(storage::usage_covering(&pool, benefit_id, account_a, tx1.date)
            .await
            .unwrap()
            .is_some());

        // tx3 evaluated, ineligible, terminally checked.
        let ext3 = storage::get_transaction_ext(&pool, tx3.id).await.unwrap().unwrap();
        assert_eq!(ext3.note, CHECKED_NO_MATCH_NOTE);

        // tx2 failed: still unscanned, selected again on the next run.
        assert!(storage::get_transaction_ext(&pool, tx2.id).await.unwrap().is_none());
        let next = scan_and_match_benefits(&pool, None, 1, None, DEFAULT_SCAN_CAP)
            .await
            .unwrap();
        assert_eq!(next.checked, 1);
        assert_eq!(next.matched, 0);
    }

    #[tokio::test]
    async fn backfill_respects_explicit_account_bounds() {
        let (_dir, pool) = test_db().await;
        let (_, _, account_a) = seed_rideshare_card(&pool, 1).await;
        let (_, _, account_b) = seed_rideshare_card(&pool, 1).await;

        synced_tx(&pool, account_a, "UBER", None, -1_000, date(2024, 1, 2)).await;
        synced_tx(&pool, account_b, "UBER", None, -1_000, date(2024, 1, 2)).await;

        let summary =
            scan_and_match_benefits(&pool, None, 1, Some(&[account_a]), DEFAULT_SCAN_CAP)
                .await
                .unwrap();
        assert_eq!(summary.checked, 1);

        // The other account's transaction is untouched.
        let remaining = storage::unmatched_transactions(&pool, &[account_b], 100).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn backfill_uses_catalog_fallback() {
        let (_dir, pool) = test_db().await;
        let product = storage::insert_card_product(&pool, "Platinum", "Amex").await.unwrap();
        let benefit_id = storage::insert_benefit(
            &pool,
            product,
            "Airline Incidental",
            "airline_credit",
            "",
            BenefitCadence::Annually,
            Some(20_000),
            &["delta"],
            None,
            None,
        )
        .await
        .unwrap();
        let account = storage::insert_linked_account(&pool, 5, "Card", Some(product))
            .await
            .unwrap();

        let catalog = BenefitCatalog::new(vec![CatalogRule {
            name: "airline incidental".to_string(),
            priority: 1,
            category: "travel".to_string(),
            pattern: "airlines".to_string(),
            match_type: Default::default(),
            benefit_kind: "airline_credit".to_string(),
            min_cents: None,
            max_cents: None,
        }]);

        // No keyword hit ("united" vs "delta"), but the catalog rule maps the
        // travel category onto the airline benefit.
        let tx = synced_tx(
            &pool,
            account,
            "UNITED AIRLINES",
            Some("travel"),
            -2_500,
            date(2024, 3, 3),
        )
        .await;

        let summary = scan_and_match_benefits(&pool, Some(&catalog), 5, None, DEFAULT_SCAN_CAP)
            .await
            .unwrap();
        assert_eq!(summary.matched, 1);

        let ext = storage::get_transaction_ext(&pool, tx.id).await.unwrap().unwrap();
        assert_eq!(ext.matched_benefit_id, Some(benefit_id));
        assert!(ext.note.contains("airline incidental"));
    }
}
