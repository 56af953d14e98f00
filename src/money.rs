//! Amount and currency extraction
//!
//! Heuristic, not a grammar: the currency rules are tried in the order of
//! [`RULES`] and the first one that matches anywhere in the text wins. Only
//! when none of them match is the first bare number taken, priced in
//! [`DEFAULT_CURRENCY`].

use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_CURRENCY: &str = "€";

/// A currency pattern; `pattern` has exactly one capture group holding the number.
#[derive(Debug, Clone, Copy)]
pub struct CurrencyRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub currency: &'static str,
}

/// Priority order matters: symbol-before beats symbol-after, euro beats dollar.
pub const RULES: &[CurrencyRule] = &[
    CurrencyRule {
        name: "euro_before",
        pattern: r"(?i)€\s*(\d+(?:[.,]\d{1,2})?)",
        currency: "€",
    },
    CurrencyRule {
        name: "dollar_before",
        pattern: r"(?i)\$\s*(\d+(?:[.,]\d{1,2})?)",
        currency: "$",
    },
    CurrencyRule {
        name: "euro_after",
        pattern: r"(?i)(\d+(?:[.,]\d{1,2})?)\s*€",
        currency: "€",
    },
    CurrencyRule {
        name: "dollar_after",
        pattern: r"(?i)(\d+(?:[.,]\d{1,2})?)\s*\$",
        currency: "$",
    },
];

const BARE_NUMBER: &str = r"(\d+(?:[.,]\d{1,2})?)";

lazy_static! {
    static ref COMPILED_RULES: Vec<(Regex, &'static CurrencyRule)> = RULES
        .iter()
        .map(|rule| (Regex::new(rule.pattern).expect("valid currency pattern"), rule))
        .collect();
    static ref BARE_NUMBER_RE: Regex = Regex::new(BARE_NUMBER).expect("valid number pattern");
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MoneyMatch {
    pub amount: Option<String>,
    pub currency: Option<&'static str>,
}

/// Extract `(amount, currency)` from free text.
pub fn extract(text: &str) -> MoneyMatch {
    for (re, rule) in COMPILED_RULES.iter() {
        if let Some(caps) = re.captures(text) {
            return MoneyMatch {
                amount: caps.get(1).map(|m| normalize(m.as_str())),
                currency: Some(rule.currency),
            };
        }
    }

    match BARE_NUMBER_RE.captures(text) {
        Some(caps) => MoneyMatch {
            amount: caps.get(1).map(|m| normalize(m.as_str())),
            currency: Some(DEFAULT_CURRENCY),
        },
        None => MoneyMatch::default(),
    }
}

/// Decimal comma becomes a point. No thousands separators.
fn normalize(raw: &str) -> String {
    raw.replace(',', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(text: &str) -> (Option<String>, Option<&'static str>) {
        let m = extract(text);
        (m.amount, m.currency)
    }

    #[test]
    fn test_euro_symbol_either_side() {
        for text in ["€12.50", "pagué €12.50 en el super", "12,50€", "taxi 12,50 € ayer"] {
            assert_eq!(pair(text), (Some("12.50".to_string()), Some("€")), "{}", text);
        }
    }

    #[test]
    fn test_dollar_symbol_either_side() {
        assert_eq!(pair("$8 cafe"), (Some("8".to_string()), Some("$")));
        assert_eq!(pair("cafe 8.5$"), (Some("8.5".to_string()), Some("$")));
    }

    #[test]
    fn test_bare_number_defaults_to_euro() {
        assert_eq!(pair("gasolina 40"), (Some("40".to_string()), Some("€")));
        assert_eq!(pair("comida 7,25"), (Some("7.25".to_string()), Some("€")));
    }

    #[test]
    fn test_no_number_yields_nothing() {
        assert_eq!(extract("solo texto"), MoneyMatch::default());
        assert_eq!(extract(""), MoneyMatch::default());
    }

    #[test]
    fn test_priority_beats_position() {
        // the dollar-before rule outranks euro-after even though 5€ comes first
        assert_eq!(pair("5€ y $20"), (Some("20".to_string()), Some("$")));
        // two bare numbers: the first one wins
        assert_eq!(pair("3 cafes 10"), (Some("3".to_string()), Some("€")));
    }

    #[test]
    fn test_extraction_is_pure() {
        let text = "cena 23,40€ con amigos";
        assert_eq!(extract(text), extract(text));
    }

    #[test]
    fn test_rule_order_is_inspectable() {
        let names: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["euro_before", "dollar_before", "euro_after", "dollar_after"]
        );
    }
}
