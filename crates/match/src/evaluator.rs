use perkledger_core::{CardBenefit, SyncedTransaction};

/// Confidence assigned to every keyword hit. Matching is deterministic, so
/// this is a constant, not a computed score.
pub const KEYWORD_MATCH_CONFIDENCE: f32 = 0.9;

/// Catalog-fallback hits carry a lower confidence than a direct keyword hit.
pub const CATALOG_MATCH_CONFIDENCE: f32 = 0.6;

/// One benefit that a transaction satisfies. Carries the benefit itself so
/// the caller can link and accrue without a second lookup.
#[derive(Debug, Clone)]
pub struct BenefitMatch {
    pub benefit: CardBenefit,
    pub confidence: f32,
    pub reason: String,
}

/// Decides whether a single transaction satisfies a single benefit.
///
/// Only credits qualify. The first keyword (benefit keyword order) contained
/// in either the display-name haystack or the raw description wins; the
/// benefit's amount guard rails, if any, are applied to the absolute amount
/// after the keyword hit.
pub fn evaluate(tx: &SyncedTransaction, benefit: &CardBenefit) -> Option<BenefitMatch> {
    if !tx.is_credit() {
        return None;
    }

    let display = tx.display_name().to_lowercase();
    let description = tx
        .description
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    let keyword = benefit.keywords.iter().find(|kw| {
        let kw = kw.to_lowercase();
        display.contains(&kw) || description.contains(&kw)
    })?;

    if let Some(rule) = &benefit.rule {
        if !rule.admits(tx.abs_amount()) {
            return None;
        }
    }

    Some(BenefitMatch {
        benefit: benefit.clone(),
        confidence: KEYWORD_MATCH_CONFIDENCE,
        reason: format!(
            "{} credit of {} matched keyword \"{}\"",
            benefit.name,
            tx.abs_amount(),
            keyword
        ),
    })
}
