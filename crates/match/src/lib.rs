pub mod catalog;
pub mod evaluator;
pub mod selector;

pub use catalog::{BenefitCatalog, CatalogRule, PatternType};
pub use evaluator::{evaluate, BenefitMatch, CATALOG_MATCH_CONFIDENCE, KEYWORD_MATCH_CONFIDENCE};
pub use selector::select_matches;
