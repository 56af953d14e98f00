//! Spending category classifier
//!
//! Keyword containment over an ordered rule list. The first rule with any
//! keyword present in the text decides the category, so rule order is part
//! of the behavior.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "Otros";

/// Built-in keyword lists, lowercase
const SUPERMARKET_KEYWORDS: &[&str] = &[
    "supermercado", "supermarket", "mercadona", "carrefour", "lidl", "aldi", "groceries",
];

const FUEL_KEYWORDS: &[&str] = &[
    "gasolina", "combustible", "diesel", "gasoil", "fuel", "repsol",
];

const FOOD_KEYWORDS: &[&str] = &[
    "restaurante", "comida", "almuerzo", "cena", "desayuno", "cafe", "food", "lunch", "dinner",
];

const TRANSPORT_KEYWORDS: &[&str] = &[
    "taxi", "uber", "cabify", "metro", "autobus", "parking", "peaje",
];

const UTILITIES_KEYWORDS: &[&str] = &[
    "electricidad", "factura luz", "agua", "internet", "telefono", "alquiler",
];

const HEALTH_KEYWORDS: &[&str] = &[
    "farmacia", "medico", "hospital", "dentista",
];

const LEISURE_KEYWORDS: &[&str] = &[
    "cine", "netflix", "spotify", "concierto",
];

const DEFAULT_RULES: &[(&str, &[&str])] = &[
    ("Supermercado", SUPERMARKET_KEYWORDS),
    ("Combustible", FUEL_KEYWORDS),
    ("Comida", FOOD_KEYWORDS),
    ("Transporte", TRANSPORT_KEYWORDS),
    ("Servicios", UTILITIES_KEYWORDS),
    ("Salud", HEALTH_KEYWORDS),
    ("Ocio", LEISURE_KEYWORDS),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub label: String,
    pub keywords: Vec<String>,
}

/// Category classifier
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    rules: Vec<CategoryRule>,
    default_label: String,
}

impl CategoryClassifier {
    /// Keywords are matched case-insensitively.
    pub fn new(rules: Vec<CategoryRule>, default_label: impl Into<String>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CategoryRule {
                label: rule.label,
                keywords: rule.keywords.iter().map(|kw| kw.to_lowercase()).collect(),
            })
            .collect();

        Self {
            rules,
            default_label: default_label.into(),
        }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn classify(&self, text: &str) -> &str {
        let text = text.to_lowercase();

        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|kw| text.contains(kw.as_str())))
            .map(|rule| rule.label.as_str())
            .unwrap_or(&self.default_label)
    }
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(label, keywords)| CategoryRule {
                label: label.to_string(),
                keywords: keywords.iter().map(|kw| kw.to_string()).collect(),
            })
            .collect();

        Self::new(rules, DEFAULT_CATEGORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_categories() {
        let classifier = CategoryClassifier::default();
        let cases = vec![
            ("Compra en Mercadona 23€", "Supermercado"),
            ("GASOLINA 40", "Combustible"),
            ("cena con clientes 60€", "Comida"),
            ("Uber al aeropuerto", "Transporte"),
            ("farmacia 8,30", "Salud"),
        ];

        for (text, expected) in cases {
            assert_eq!(classifier.classify(text), expected, "{}", text);
        }
    }

    #[test]
    fn test_rule_order_decides_ties() {
        let classifier = CategoryClassifier::default();
        assert_eq!(classifier.classify("supermercado y gasolina"), "Supermercado");
        assert_eq!(classifier.classify("gasolina y supermercado"), "Supermercado");
        assert_eq!(classifier.classify("gasolina y comida"), "Combustible");
    }

    #[test]
    fn test_unmatched_text_gets_default() {
        let classifier = CategoryClassifier::default();
        assert_eq!(classifier.classify("regalo cumpleaños"), DEFAULT_CATEGORY);
        assert_eq!(classifier.classify(""), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_custom_rules_are_lowercased() {
        let classifier = CategoryClassifier::new(
            vec![CategoryRule {
                label: "Oficina".into(),
                keywords: vec!["PAPELERIA".into()],
            }],
            "Varios",
        );
        assert_eq!(classifier.classify("papeleria 4€"), "Oficina");
        assert_eq!(classifier.classify("pan"), "Varios");
    }
}
