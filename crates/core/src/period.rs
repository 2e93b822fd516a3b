use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How often a benefit's cap resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenefitCadence {
    Monthly,
    Quarterly,
    SemiAnnually,
    Annually,
}

impl fmt::Display for BenefitCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenefitCadence::Monthly => write!(f, "monthly"),
            BenefitCadence::Quarterly => write!(f, "quarterly"),
            BenefitCadence::SemiAnnually => write!(f, "semiannually"),
            BenefitCadence::Annually => write!(f, "annually"),
        }
    }
}

impl BenefitCadence {
    /// Lenient parse. Card issuers are inconsistent about timing labels, so
    /// anything unrecognized buckets annually.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "monthly" => BenefitCadence::Monthly,
            "quarterly" => BenefitCadence::Quarterly,
            "semiannually" | "semi-annually" | "semi_annually" => BenefitCadence::SemiAnnually,
            _ => BenefitCadence::Annually,
        }
    }

    /// The calendar-aligned accounting period enclosing `date`, as inclusive
    /// day bounds.
    pub fn period_for(self, date: NaiveDate) -> DateRange {
        let year = date.year();
        match self {
            BenefitCadence::Monthly => {
                let start = NaiveDate::from_ymd_opt(year, date.month(), 1).unwrap();
                DateRange::new(start, end_of_month(year, date.month()))
            }
            BenefitCadence::Quarterly => {
                let first_month = ((date.month() - 1) / 3) * 3 + 1;
                let start = NaiveDate::from_ymd_opt(year, first_month, 1).unwrap();
                DateRange::new(start, end_of_month(year, first_month + 2))
            }
            BenefitCadence::SemiAnnually => {
                if date.month() <= 6 {
                    DateRange::new(
                        NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
                        NaiveDate::from_ymd_opt(year, 6, 30).unwrap(),
                    )
                } else {
                    DateRange::new(
                        NaiveDate::from_ymd_opt(year, 7, 1).unwrap(),
                        NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
                    )
                }
            }
            BenefitCadence::Annually => DateRange::new(
                NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            ),
        }
    }
}

/// Last calendar day of a month: the day before the first of the next month.
fn end_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
