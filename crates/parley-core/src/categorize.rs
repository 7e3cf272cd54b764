//! Category assignment for extracted transactions
//!
//! The taxonomy itself is a closed set owned elsewhere (`Category`). The
//! classifier maps a description and payment channel to one of its members
//! with a keyword rule table, falling back to `Category::Uncategorized`.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Category, Direction};

/// Maps a transaction description and payment type to a category
pub trait CategoryClassifier: Send + Sync {
    fn categorize(&self, description: &str, payment_type: &str) -> Category;
}

/// Rule-table classifier over lower-cased description and payment type
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

/// Ordered rules: the first matching keyword wins
const RULES: &[(Category, &[&str])] = &[
    (
        Category::Income,
        &[
            "payroll",
            "salary",
            "paycheck",
            "direct deposit",
            "dividend",
            "interest earned",
        ],
    ),
    (
        Category::Transfer,
        &["zelle", "venmo", "transfer", "xfer", "paypal", "cash app"],
    ),
    (
        Category::Subscriptions,
        &[
            "netflix",
            "spotify",
            "hulu",
            "disney+",
            "subscription",
            "icloud",
            "patreon",
        ],
    ),
    (
        Category::Groceries,
        &[
            "grocery",
            "groceries",
            "whole foods",
            "safeway",
            "trader joe",
            "kroger",
            "aldi",
            "supermarket",
        ],
    ),
    (
        Category::Dining,
        &[
            "restaurant",
            "cafe",
            "coffee",
            "starbucks",
            "lunch",
            "dinner",
            "breakfast",
            "pizza",
            "doordash",
            "grubhub",
            "mcdonald",
            "chipotle",
        ],
    ),
    (
        Category::Transport,
        &[
            "uber", "lyft", "gas", "fuel", "shell", "chevron", "exxon", "parking", "toll",
            "transit", "metro",
        ],
    ),
    (
        Category::Travel,
        &["airline", "airbnb", "hotel", "flight", "delta", "united", "expedia"],
    ),
    (
        Category::Housing,
        &["rent", "mortgage", "landlord", "hoa"],
    ),
    (
        Category::Utilities,
        &[
            "electric", "water bill", "utility", "internet", "comcast", "verizon", "at&t",
            "phone bill",
        ],
    ),
    (
        Category::Healthcare,
        &["pharmacy", "cvs", "walgreens", "doctor", "dental", "clinic", "hospital"],
    ),
    (
        Category::Entertainment,
        &["movie", "cinema", "concert", "steam", "ticketmaster", "theater"],
    ),
    (
        Category::Shopping,
        &[
            "amazon", "target", "walmart", "costco", "best buy", "ikea", "etsy", "ebay",
        ],
    ),
];

/// One case-insensitive regex per rule
///
/// Keywords must stand alone as words, so "gas" does not match "vegas".
/// The boundary is any non-word character rather than `\b`, which would
/// never match after keywords ending in punctuation such as "disney+".
fn compiled_rules() -> &'static [(Category, Regex)] {
    static COMPILED: OnceLock<Vec<(Category, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(category, keywords)| {
                let alternatives = keywords
                    .iter()
                    .map(|k| {
                        k.split_whitespace()
                            .map(regex::escape)
                            .collect::<Vec<_>>()
                            .join(r"\s+")
                    })
                    .collect::<Vec<_>>()
                    .join("|");
                let pattern = format!(r"(?i)(?:^|\W)(?:{})(?:\W|$)", alternatives);
                (
                    *category,
                    Regex::new(&pattern).expect("category keyword regex"),
                )
            })
            .collect()
    })
}

impl CategoryClassifier for KeywordClassifier {
    fn categorize(&self, description: &str, payment_type: &str) -> Category {
        let haystack = format!("{} {}", description, payment_type);
        compiled_rules()
            .iter()
            .find(|(_, re)| re.is_match(&haystack))
            .map_or(Category::Uncategorized, |(category, _)| *category)
    }
}

/// Category consistent with a (possibly changed) direction
///
/// Incoming money in the default expense bucket becomes `Income`; outgoing
/// money previously filed as `Income` is re-classified from its description.
pub fn category_for_direction(
    classifier: &dyn CategoryClassifier,
    current: Category,
    direction: Direction,
    description: &str,
    payment_type: &str,
) -> Category {
    match (direction, current) {
        (Direction::In, Category::Uncategorized) => Category::Income,
        (Direction::Out, Category::Income) => {
            match classifier.categorize(description, payment_type) {
                Category::Income => Category::Uncategorized,
                other => other,
            }
        }
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_rules() {
        let c = KeywordClassifier::new();
        assert_eq!(c.categorize("Whole Foods Market", ""), Category::Groceries);
        assert_eq!(c.categorize("NETFLIX.COM", "card"), Category::Subscriptions);
        assert_eq!(c.categorize("Sam", "Zelle"), Category::Transfer);
        assert_eq!(c.categorize("ACME PAYROLL", "ACH"), Category::Income);
        assert_eq!(c.categorize("Target", ""), Category::Shopping);
    }

    #[test]
    fn test_word_boundaries() {
        let c = KeywordClassifier::new();
        assert_eq!(c.categorize("Las Vegas trip souvenirs", ""), Category::Uncategorized);
        assert_eq!(c.categorize("Shell Oil 123", ""), Category::Transport);
        assert_eq!(c.categorize("Gaslight bookshop", ""), Category::Uncategorized);
        assert_eq!(c.categorize("rental car deposit", ""), Category::Uncategorized);
    }

    #[test]
    fn test_keywords_with_punctuation_and_spacing() {
        let c = KeywordClassifier::new();
        assert_eq!(c.categorize("DISNEY+ monthly", ""), Category::Subscriptions);
        assert_eq!(c.categorize("AT&T WIRELESS", "ACH"), Category::Utilities);
        assert_eq!(c.categorize("ACME DIRECT  DEPOSIT", ""), Category::Income);
        assert_eq!(c.categorize("Coffee-shop", ""), Category::Dining);
        assert_eq!(c.categorize("Coffeehouse", ""), Category::Uncategorized);
    }

    #[test]
    fn test_unknown_falls_back() {
        let c = KeywordClassifier::new();
        assert_eq!(c.categorize("Acme Corp", ""), Category::Uncategorized);
    }

    #[test]
    fn test_direction_reassignment() {
        let c = KeywordClassifier::new();
        assert_eq!(
            category_for_direction(&c, Category::Uncategorized, Direction::In, "Acme", ""),
            Category::Income
        );
        assert_eq!(
            category_for_direction(&c, Category::Income, Direction::Out, "Target", ""),
            Category::Shopping
        );
        assert_eq!(
            category_for_direction(&c, Category::Dining, Direction::In, "Cafe refund", ""),
            Category::Dining
        );
    }
}
