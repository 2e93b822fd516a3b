use perkledger_core::{CardBenefit, SyncedTransaction};

use crate::catalog::BenefitCatalog;
use crate::evaluator::{evaluate, BenefitMatch, CATALOG_MATCH_CONFIDENCE};

/// Runs the evaluator over every active benefit in definition order and
/// collects all hits. Callers treat index 0 as authoritative; definition
/// order is the explicit tie-break when benefits share keywords.
///
/// When the keyword pass comes up empty and a catalog is supplied, the
/// category-keyed fallback may contribute a single lower-confidence match.
pub fn select_matches(
    tx: &SyncedTransaction,
    benefits: &[CardBenefit],
    catalog: Option<&BenefitCatalog>,
) -> Vec<BenefitMatch> {
    let mut matches: Vec<BenefitMatch> = benefits
        .iter()
        .filter(|b| b.active)
        .filter_map(|b| evaluate(tx, b))
        .collect();

    if matches.is_empty() {
        if let Some(catalog) = catalog {
            matches.extend(catalog_fallback(tx, benefits, catalog));
        }
    }

    matches
}

fn catalog_fallback(
    tx: &SyncedTransaction,
    benefits: &[CardBenefit],
    catalog: &BenefitCatalog,
) -> Option<BenefitMatch> {
    if !tx.is_credit() {
        return None;
    }
    let category = tx.category.as_deref()?;
    let rule = catalog.find_rule(category, tx.display_name(), tx.abs_amount().to_cents())?;
    let benefit = benefits
        .iter()
        .find(|b| b.active && b.kind.eq_ignore_ascii_case(&rule.benefit_kind))?;

    Some(BenefitMatch {
        benefit: benefit.clone(),
        confidence: CATALOG_MATCH_CONFIDENCE,
        reason: format!(
            "{} credit of {} matched catalog rule \"{}\"",
            benefit.name,
            tx.abs_amount(),
            rule.name
        ),
    })
}
