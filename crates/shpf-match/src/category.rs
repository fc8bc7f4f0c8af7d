use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shpf_core::{ListingRecord, UNCATEGORIZED};

static TRAILING_GRADE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]$").expect("trailing grade pattern is valid"));

/// How a source exposes the condition/grade of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryPolicy {
    /// Grade is a standalone capital letter ending the name (`"... Negro B"`).
    TrailingGrade,
    /// Grade is a separate status field scraped next to the name.
    StatusField,
}

impl CategoryPolicy {
    pub fn classify(self, record: &ListingRecord) -> String {
        let label = match self {
            CategoryPolicy::TrailingGrade => trailing_grade(&record.raw_name),
            CategoryPolicy::StatusField => record
                .category_hint
                .as_deref()
                .filter(|hint| !hint.trim().is_empty())
                .map(ToString::to_string),
        };
        label.unwrap_or_else(|| UNCATEGORIZED.to_string())
    }
}

pub fn trailing_grade(name: &str) -> Option<String> {
    TRAILING_GRADE
        .find(name.trim())
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shpf_core::Source;

    fn cex(name: &str) -> ListingRecord {
        ListingRecord::new(Source::Cex, name, "100€")
    }

    #[test]
    fn trailing_grade_takes_final_standalone_capital() {
        assert_eq!(trailing_grade("Apple iPhone 12 64GB Negro, Libre B").as_deref(), Some("B"));
        assert_eq!(trailing_grade("iPhone X").as_deref(), Some("X"));
        assert_eq!(trailing_grade("Galaxy S21 5G 128GB C  ").as_deref(), Some("C"));
    }

    #[test]
    fn trailing_grade_ignores_letters_glued_to_a_word() {
        assert_eq!(trailing_grade("iPhone 12 64GB"), None);
        assert_eq!(trailing_grade("iphone 12 b"), None);
        assert_eq!(trailing_grade(""), None);
    }

    #[test]
    fn trailing_policy_falls_back_to_uncategorized() {
        assert_eq!(CategoryPolicy::TrailingGrade.classify(&cex("iPhone 12 A")), "A");
        assert_eq!(CategoryPolicy::TrailingGrade.classify(&cex("iPhone 12 64GB")), UNCATEGORIZED);
    }

    #[test]
    fn status_policy_uses_hint_verbatim() {
        let record = ListingRecord::new(Source::BackMarket, "iPhone 12", "300 €")
            .with_category_hint("Muy bueno");
        assert_eq!(CategoryPolicy::StatusField.classify(&record), "Muy bueno");
    }

    #[test]
    fn status_policy_ignores_the_name_and_blank_hints() {
        assert_eq!(CategoryPolicy::StatusField.classify(&cex("iPhone 12 A")), UNCATEGORIZED);
        let blank = cex("iPhone 12").with_category_hint("   ");
        assert_eq!(CategoryPolicy::StatusField.classify(&blank), UNCATEGORIZED);
    }

    #[test]
    fn policies_deserialize_from_snake_case() {
        let policy: CategoryPolicy = serde_json::from_str(r#""trailing_grade""#).unwrap();
        assert_eq!(policy, CategoryPolicy::TrailingGrade);
        let policy: CategoryPolicy = serde_json::from_str(r#""status_field""#).unwrap();
        assert_eq!(policy, CategoryPolicy::StatusField);
    }
}
