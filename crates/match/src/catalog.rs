use serde::{Deserialize, Serialize};

/// A fallback matching rule keyed by merchant category. These come from a
/// static TOML table loaded once at startup, not from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRule {
    pub name: String,
    pub priority: i32,
    pub category: String,
    pub pattern: String,
    #[serde(default)]
    pub match_type: PatternType,
    pub benefit_kind: String,
    pub min_cents: Option<i64>,
    pub max_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    #[default]
    Contains,
    Exact,
    Regex,
}

impl std::str::FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(PatternType::Contains),
            "exact" => Ok(PatternType::Exact),
            "regex" => Ok(PatternType::Regex),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: CatalogRule,
    compiled_regex: Option<regex::Regex>,
}

/// Immutable lookup table for the legacy category-keyed fallback path. Built
/// once, never mutated.
pub struct BenefitCatalog {
    rules: Vec<CompiledRule>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    rule: Vec<CatalogRule>,
}

impl BenefitCatalog {
    pub fn new(rules: Vec<CatalogRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = if let PatternType::Regex = &rule.match_type {
                    regex::Regex::new(&rule.pattern).ok()
                } else {
                    None
                };
                CompiledRule { rule, compiled_regex }
            })
            .collect();
        // Highest priority first.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    /// Parses a `[[rule]]` TOML document.
    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        let file: CatalogFile =
            toml::from_str(toml_content).map_err(|e| format!("Failed to parse TOML: {e}"))?;
        Ok(Self::new(file.rule))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule (highest priority) for `category` whose pattern matches the
    /// merchant text and whose cent bounds admit `amount_cents` (absolute).
    pub fn find_rule(
        &self,
        category: &str,
        merchant_text: &str,
        amount_cents: i64,
    ) -> Option<&CatalogRule> {
        self.rules
            .iter()
            .filter(|cr| cr.rule.category.eq_ignore_ascii_case(category))
            .find(|cr| self.rule_matches(cr, merchant_text, amount_cents))
            .map(|cr| &cr.rule)
    }

    fn rule_matches(&self, cr: &CompiledRule, merchant_text: &str, amount_cents: i64) -> bool {
        let rule = &cr.rule;

        if let Some(min) = rule.min_cents {
            if amount_cents < min {
                return false;
            }
        }
        if let Some(max) = rule.max_cents {
            if amount_cents > max {
                return false;
            }
        }

        let text = merchant_text.to_lowercase();
        let pattern = rule.pattern.to_lowercase();

        match &rule.match_type {
            PatternType::Contains => text.contains(&pattern),
            PatternType::Exact => text == pattern,
            PatternType::Regex => cr
                .compiled_regex
                .as_ref()
                .is_some_and(|re| re.is_match(merchant_text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rule(category: &str, pattern: &str, kind: &str, priority: i32) -> CatalogRule {
        CatalogRule {
            name: format!("{category}/{pattern}"),
            priority,
            category: category.to_string(),
            pattern: pattern.to_string(),
            match_type: PatternType::Contains,
            benefit_kind: kind.to_string(),
            min_cents: None,
            max_cents: None,
        }
    }

    #[test]
    fn contains_match_case_insensitive() {
        let catalog = BenefitCatalog::new(vec![make_rule("travel", "airline", "airline_credit", 1)]);
        assert!(catalog.find_rule("Travel", "UNITED AIRLINES REFUND", 10_000).is_some());
        assert!(catalog.find_rule("Travel", "STARBUCKS", 500).is_none());
    }

    #[test]
    fn category_must_match() {
        let catalog = BenefitCatalog::new(vec![make_rule("travel", "airline", "airline_credit", 1)]);
        assert!(catalog.find_rule("dining", "UNITED AIRLINES", 10_000).is_none());
    }

    #[test]
    fn regex_pattern() {
        let mut rule = make_rule("travel", r"^DELTA|UNITED", "airline_credit", 1);
        rule.match_type = PatternType::Regex;
        let catalog = BenefitCatalog::new(vec![rule]);
        assert!(catalog.find_rule("travel", "DELTA AIR LINES", 5000).is_some());
        assert!(catalog.find_rule("travel", "ALASKA AIR", 5000).is_none());
    }

    #[test]
    fn exact_pattern() {
        let mut rule = make_rule("streaming", "netflix", "streaming_credit", 1);
        rule.match_type = PatternType::Exact;
        let catalog = BenefitCatalog::new(vec![rule]);
        assert!(catalog.find_rule("streaming", "NETFLIX", 1599).is_some());
        assert!(catalog.find_rule("streaming", "NETFLIX.COM", 1599).is_none());
    }

    #[test]
    fn priority_ordering_highest_wins() {
        let catalog = BenefitCatalog::new(vec![
            make_rule("travel", "air", "generic_travel", 1),
            make_rule("travel", "air", "airline_credit", 10),
        ]);
        let rule = catalog.find_rule("travel", "AIR CANADA", 5000).unwrap();
        assert_eq!(rule.benefit_kind, "airline_credit");
    }

    #[test]
    fn cent_bounds_filter() {
        let mut rule = make_rule("dining", "dashpass", "dining_credit", 1);
        rule.min_cents = Some(1000);
        rule.max_cents = Some(2000);
        let catalog = BenefitCatalog::new(vec![rule]);
        assert!(catalog.find_rule("dining", "DASHPASS", 1500).is_some());
        assert!(catalog.find_rule("dining", "DASHPASS", 999).is_none());
        assert!(catalog.find_rule("dining", "DASHPASS", 2001).is_none());
    }

    #[test]
    fn from_toml_rule_array() {
        let catalog = BenefitCatalog::from_toml(
            r#"
            [[rule]]
            name = "airline incidental"
            priority = 5
            category = "travel"
            pattern = "airline"
            benefit_kind = "airline_credit"

            [[rule]]
            name = "streaming"
            priority = 1
            category = "entertainment"
            pattern = "netflix"
            match_type = "exact"
            benefit_kind = "streaming_credit"
            "#,
        )
        .unwrap();
        assert!(!catalog.is_empty());
        assert!(catalog.find_rule("travel", "AMERICAN AIRLINES", 2500).is_some());
    }

    #[test]
    fn from_toml_rejects_garbage() {
        assert!(BenefitCatalog::from_toml("rule = 3").is_err());
    }

    #[test]
    fn empty_catalog_matches_nothing() {
        let catalog = BenefitCatalog::new(vec![]);
        assert!(catalog.is_empty());
        assert!(catalog.find_rule("travel", "ANYTHING", 100).is_none());
    }
}
