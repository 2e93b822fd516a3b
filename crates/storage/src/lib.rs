pub mod db;

pub use db::{
    accounts_for_user, accrue_usage, benefits_for_account, create_db, get_transaction_ext,
    insert_benefit, insert_card_product, insert_linked_account, insert_transaction,
    mark_transaction_checked, unmatched_transactions, upsert_transaction_ext, usage_covering,
    usage_for_account, BenefitUsage, DbPool, StorageError, TransactionExt, UsageReportRow,
    CHECKED_NO_MATCH_NOTE,
};
