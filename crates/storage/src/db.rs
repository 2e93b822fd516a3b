use chrono::NaiveDate;
use perkledger_core::{
    BenefitCadence, BenefitId, BenefitRule, CardBenefit, CardProductId, DateRange,
    LinkedAccountId, Money, SyncedTransaction, TransactionId,
};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite, SqliteConnection};
use std::path::Path;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

/// Note written to `transaction_ext` when a transaction was evaluated and no
/// benefit matched. Rows carrying this note leave the backfill selection for
/// good.
pub const CHECKED_NO_MATCH_NOTE: &str = "checked - no matching benefit";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("row decode failed: {0}")]
    Decode(String),
}

/// The 1:1 annotation row keyed by transaction identity. At most one row per
/// transaction; the upsert overwrites `matched_benefit_id` and `note`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionExt {
    pub transaction_id: TransactionId,
    pub matched_benefit_id: Option<BenefitId>,
    pub note: String,
    pub updated_at: String,
}

/// The ledger row: used/remaining amounts for one benefit, one account, one
/// accounting period. `max` and `remaining` are `None` for uncapped benefits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenefitUsage {
    pub id: i64,
    pub benefit_id: BenefitId,
    pub account_id: LinkedAccountId,
    pub period: DateRange,
    pub used: Money,
    pub max: Option<Money>,
    pub remaining: Option<Money>,
}

/// One line of the per-account usage report.
#[derive(Debug, Clone)]
pub struct UsageReportRow {
    pub benefit_name: String,
    pub period: DateRange,
    pub used: Money,
    pub remaining: Option<Money>,
}

pub async fn create_db(path: &Path) -> Result<DbPool, StorageError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS card_products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            issuer TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS card_benefits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            timing TEXT NOT NULL,
            max_cents INTEGER,
            keywords TEXT NOT NULL,
            rule_min_cents INTEGER,
            rule_max_cents INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (product_id) REFERENCES card_products(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS linked_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            card_product_id INTEGER,
            FOREIGN KEY (card_product_id) REFERENCES card_products(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            merchant_name TEXT,
            description TEXT,
            category TEXT,
            amount_cents INTEGER NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY (account_id) REFERENCES linked_accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transaction_ext (
            transaction_id INTEGER PRIMARY KEY,
            matched_benefit_id INTEGER,
            note TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE,
            FOREIGN KEY (matched_benefit_id) REFERENCES card_benefits(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS benefit_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            benefit_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            used_cents INTEGER NOT NULL,
            max_cents INTEGER,
            remaining_cents INTEGER,
            FOREIGN KEY (benefit_id) REFERENCES card_benefits(id) ON DELETE CASCADE,
            FOREIGN KEY (account_id) REFERENCES linked_accounts(id),
            UNIQUE (benefit_id, account_id, period_start)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account_date ON transactions(account_id, date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_card_product(
    pool: &DbPool,
    name: &str,
    issuer: &str,
) -> Result<CardProductId, StorageError> {
    let row = sqlx::query("INSERT INTO card_products (name, issuer) VALUES (?, ?) RETURNING id")
        .bind(name)
        .bind(issuer)
        .fetch_one(pool)
        .await?;
    Ok(CardProductId(row.get("id")))
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_benefit(
    pool: &DbPool,
    product_id: CardProductId,
    name: &str,
    kind: &str,
    description: &str,
    timing: BenefitCadence,
    max_cents: Option<i64>,
    keywords: &[&str],
    rule_min_cents: Option<i64>,
    rule_max_cents: Option<i64>,
) -> Result<BenefitId, StorageError> {
    let keywords_json = serde_json::to_string(keywords)
        .map_err(|e| StorageError::Decode(format!("keyword list: {e}")))?;
    let row = sqlx::query(
        r#"
        INSERT INTO card_benefits
            (product_id, name, kind, description, timing, max_cents, keywords, rule_min_cents, rule_max_cents, active)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
        RETURNING id
        "#,
    )
    .bind(product_id.0)
    .bind(name)
    .bind(kind)
    .bind(description)
    .bind(timing.to_string())
    .bind(max_cents)
    .bind(&keywords_json)
    .bind(rule_min_cents)
    .bind(rule_max_cents)
    .fetch_one(pool)
    .await?;
    Ok(BenefitId(row.get("id")))
}

pub async fn insert_linked_account(
    pool: &DbPool,
    user_id: i64,
    name: &str,
    card_product_id: Option<CardProductId>,
) -> Result<LinkedAccountId, StorageError> {
    let row = sqlx::query(
        "INSERT INTO linked_accounts (user_id, name, card_product_id) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(name)
    .bind(card_product_id.map(|p| p.0))
    .fetch_one(pool)
    .await?;
    Ok(LinkedAccountId(row.get("id")))
}

/// Write path for the external sync collaborator (and for test fixtures).
#[allow(clippy::too_many_arguments)]
pub async fn insert_transaction(
    pool: &DbPool,
    account_id: LinkedAccountId,
    name: &str,
    merchant_name: Option<&str>,
    description: Option<&str>,
    category: Option<&str>,
    amount_cents: i64,
    date: NaiveDate,
) -> Result<TransactionId, StorageError> {
    let row = sqlx::query(
        r#"
        INSERT INTO transactions (account_id, name, merchant_name, description, category, amount_cents, date)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(account_id.0)
    .bind(name)
    .bind(merchant_name)
    .bind(description)
    .bind(category)
    .bind(amount_cents)
    .bind(date.to_string())
    .fetch_one(pool)
    .await?;
    Ok(TransactionId(row.get("id")))
}

/// Benefits defined by the card product linked to `account_id`, in definition
/// order. `Ok(None)` when the account has no linked card product — the
/// caller's short-circuit signal.
pub async fn benefits_for_account(
    pool: &DbPool,
    account_id: LinkedAccountId,
) -> Result<Option<Vec<CardBenefit>>, StorageError> {
    let linkage: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT card_product_id FROM linked_accounts WHERE id = ?")
            .bind(account_id.0)
            .fetch_optional(pool)
            .await?;

    let Some((Some(product_id),)) = linkage else {
        return Ok(None);
    };

    let rows = sqlx::query_as::<
        _,
        (
            i64,
            i64,
            String,
            String,
            String,
            String,
            Option<i64>,
            String,
            Option<i64>,
            Option<i64>,
            i64,
        ),
    >(
        r#"
        SELECT id, product_id, name, kind, description, timing, max_cents, keywords,
               rule_min_cents, rule_max_cents, active
        FROM card_benefits
        WHERE product_id = ?
        ORDER BY id
        "#,
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    let mut benefits = Vec::with_capacity(rows.len());
    for r in rows {
        let keywords: Vec<String> = serde_json::from_str(&r.7)
            .map_err(|e| StorageError::Decode(format!("benefit {} keywords: {e}", r.0)))?;
        let rule = match (r.8, r.9) {
            (None, None) => None,
            (min, max) => Some(BenefitRule {
                min_amount: min.map(Money::from_cents),
                max_amount: max.map(Money::from_cents),
            }),
        };
        benefits.push(CardBenefit {
            id: BenefitId(r.0),
            product_id: CardProductId(r.1),
            name: r.2,
            kind: r.3,
            description: r.4,
            timing: BenefitCadence::parse(&r.5),
            max_amount: r.6.map(Money::from_cents),
            keywords,
            rule,
            active: r.10 != 0,
        });
    }
    Ok(Some(benefits))
}

/// Idempotent upsert keyed by transaction id: creates the annotation row on
/// first evaluation, overwrites `matched_benefit_id` and `note` on every
/// subsequent one.
pub async fn upsert_transaction_ext(
    conn: &mut SqliteConnection,
    transaction_id: TransactionId,
    matched_benefit_id: Option<BenefitId>,
    note: &str,
) -> Result<TransactionExt, StorageError> {
    let row = sqlx::query_as::<_, (i64, Option<i64>, String, String)>(
        r#"
        INSERT INTO transaction_ext (transaction_id, matched_benefit_id, note, updated_at)
        VALUES (?, ?, ?, datetime('now'))
        ON CONFLICT(transaction_id) DO UPDATE SET
            matched_benefit_id = excluded.matched_benefit_id,
            note = excluded.note,
            updated_at = excluded.updated_at
        RETURNING transaction_id, matched_benefit_id, note, updated_at
        "#,
    )
    .bind(transaction_id.0)
    .bind(matched_benefit_id.map(|b| b.0))
    .bind(note)
    .fetch_one(&mut *conn)
    .await?;

    Ok(TransactionExt {
        transaction_id: TransactionId(row.0),
        matched_benefit_id: row.1.map(BenefitId),
        note: row.2,
        updated_at: row.3,
    })
}

/// Marks a transaction as evaluated with no matching benefit, removing it
/// from future backfill selections.
pub async fn mark_transaction_checked(
    conn: &mut SqliteConnection,
    transaction_id: TransactionId,
) -> Result<TransactionExt, StorageError> {
    upsert_transaction_ext(conn, transaction_id, None, CHECKED_NO_MATCH_NOTE).await
}

pub async fn get_transaction_ext(
    pool: &DbPool,
    transaction_id: TransactionId,
) -> Result<Option<TransactionExt>, StorageError> {
    let row = sqlx::query_as::<_, (i64, Option<i64>, String, String)>(
        "SELECT transaction_id, matched_benefit_id, note, updated_at FROM transaction_ext WHERE transaction_id = ?",
    )
    .bind(transaction_id.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| TransactionExt {
        transaction_id: TransactionId(r.0),
        matched_benefit_id: r.1.map(BenefitId),
        note: r.2,
        updated_at: r.3,
    }))
}

/// Atomic increment-or-create for the usage ledger row. A single UPSERT so
/// concurrent accruals against the same (benefit, account, period) key cannot
/// lose updates. `remaining_cents` is re-clamped to >= 0 on every write and
/// stays NULL for uncapped benefits; `max_cents` is fixed at creation time.
pub async fn accrue_usage(
    conn: &mut SqliteConnection,
    benefit_id: BenefitId,
    account_id: LinkedAccountId,
    period: DateRange,
    delta_cents: i64,
    max_cents: Option<i64>,
) -> Result<(), StorageError> {
    let initial_remaining = max_cents.map(|m| (m - delta_cents).max(0));
    sqlx::query(
        r#"
        INSERT INTO benefit_usage
            (benefit_id, account_id, period_start, period_end, used_cents, max_cents, remaining_cents)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(benefit_id, account_id, period_start) DO UPDATE SET
            used_cents = used_cents + excluded.used_cents,
            remaining_cents = CASE
                WHEN max_cents IS NULL THEN NULL
                ELSE MAX(0, max_cents - (used_cents + excluded.used_cents))
            END
        "#,
    )
    .bind(benefit_id.0)
    .bind(account_id.0)
    .bind(period.start.to_string())
    .bind(period.end.to_string())
    .bind(delta_cents)
    .bind(max_cents)
    .bind(initial_remaining)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// The usage row for (benefit, account) whose stored period bounds cover
/// `date`, if one exists yet.
pub async fn usage_covering(
    pool: &DbPool,
    benefit_id: BenefitId,
    account_id: LinkedAccountId,
    date: NaiveDate,
) -> Result<Option<BenefitUsage>, StorageError> {
    let row = sqlx::query_as::<_, (i64, i64, i64, String, String, i64, Option<i64>, Option<i64>)>(
        r#"
        SELECT id, benefit_id, account_id, period_start, period_end, used_cents, max_cents, remaining_cents
        FROM benefit_usage
        WHERE benefit_id = ? AND account_id = ? AND period_start <= ? AND period_end >= ?
        "#,
    )
    .bind(benefit_id.0)
    .bind(account_id.0)
    .bind(date.to_string())
    .bind(date.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(BenefitUsage {
            id: r.0,
            benefit_id: BenefitId(r.1),
            account_id: LinkedAccountId(r.2),
            period: DateRange::new(parse_date(&r.3)?, parse_date(&r.4)?),
            used: Money::from_cents(r.5),
            max: r.6.map(Money::from_cents),
            remaining: r.7.map(Money::from_cents),
        })
    })
    .transpose()
}

/// Per-benefit usage for the period covering `date`, joined with benefit
/// names, for the operator report.
pub async fn usage_for_account(
    pool: &DbPool,
    account_id: LinkedAccountId,
    date: NaiveDate,
) -> Result<Vec<UsageReportRow>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String, String, i64, Option<i64>)>(
        r#"
        SELECT b.name, u.period_start, u.period_end, u.used_cents, u.remaining_cents
        FROM benefit_usage u
        JOIN card_benefits b ON b.id = u.benefit_id
        WHERE u.account_id = ? AND u.period_start <= ? AND u.period_end >= ?
        ORDER BY b.id
        "#,
    )
    .bind(account_id.0)
    .bind(date.to_string())
    .bind(date.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(UsageReportRow {
                benefit_name: r.0,
                period: DateRange::new(parse_date(&r.1)?, parse_date(&r.2)?),
                used: Money::from_cents(r.3),
                remaining: r.4.map(Money::from_cents),
            })
        })
        .collect()
}

pub async fn accounts_for_user(
    pool: &DbPool,
    user_id: i64,
) -> Result<Vec<LinkedAccountId>, StorageError> {
    let rows = sqlx::query_as::<_, (i64,)>(
        "SELECT id FROM linked_accounts WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| LinkedAccountId(r.0)).collect())
}

/// Transactions in `accounts` with no match decision yet: either no
/// annotation row exists, or one exists with a null match that is not the
/// terminal checked-no-match marker. One query with an OR condition, so a
/// single scan pass cannot yield duplicate candidates. Date-ordered, capped.
pub async fn unmatched_transactions(
    pool: &DbPool,
    accounts: &[LinkedAccountId],
    cap: u32,
) -> Result<Vec<SyncedTransaction>, StorageError> {
    if accounts.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; accounts.len()].join(", ");
    let sql = format!(
        r#"
        SELECT t.id, t.account_id, t.name, t.merchant_name, t.description, t.category,
               t.amount_cents, t.date
        FROM transactions t
        LEFT JOIN transaction_ext x ON x.transaction_id = t.id
        WHERE t.account_id IN ({placeholders})
          AND (x.transaction_id IS NULL
               OR (x.matched_benefit_id IS NULL AND x.note <> ?))
        ORDER BY t.date, t.id
        LIMIT ?
        "#
    );

    let mut query = sqlx::query_as::<
        _,
        (
            i64,
            i64,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            i64,
            String,
        ),
    >(&sql);
    for account in accounts {
        query = query.bind(account.0);
    }
    let rows = query
        .bind(CHECKED_NO_MATCH_NOTE)
        .bind(i64::from(cap))
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|r| {
            Ok(SyncedTransaction {
                id: TransactionId(r.0),
                account_id: LinkedAccountId(r.1),
                name: r.2,
                merchant_name: r.3,
                description: r.4,
                category: r.5,
                amount: Money::from_cents(r.6),
                date: parse_date(&r.7)?,
            })
        })
        .collect()
}

fn parse_date(s: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| StorageError::Decode(format!("invalid date '{s}': {e}")))
}
