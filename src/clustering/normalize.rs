// Food-name normalization ahead of embedding.
//
// "Chicken Breasts, Grilled - 4 oz" → ["chicken", "breast", "grilled"]
//
// Lowercase, split on anything non-alphabetic, drop stopwords (English plus
// serving units and size words), drop short tokens, then fold plurals with a
// small suffix lemmatizer. The embedder needs at least two tokens, so short
// results are padded.

use std::collections::HashSet;

use stop_words::{get, LANGUAGE};

use crate::config::NormalizeConfig;

/// Units, sizes, and packaging words that say nothing about what the food is.
pub const DOMAIN_STOPWORDS: &[&str] = &[
    // mass and volume units, as diaries spell them
    "ounce", "ounces", "floz", "gram", "grams", "kilogram", "kilograms", "pound", "pounds",
    "cups", "tbsp", "tbsps", "tsps", "tablespoon", "tablespoons", "teaspoon", "teaspoons",
    "fluid", "liter", "liters", "litre", "litres", "milliliter", "milliliters", "millilitre",
    "millilitres", "pint", "pints", "quart", "quarts", "gallon", "gallons",
    // counts and packaging
    "serving", "servings", "slice", "slices", "piece", "pieces", "each", "container",
    "containers", "package", "packages", "packet", "packets", "pack", "packs", "bottle",
    "bottles", "cans", "scoop", "scoops", "portion", "portions",
    // sizes
    "large", "medium", "small", "extra", "jumbo", "mini", "whole", "half",
    // labelling noise
    "generic", "homemade", "brand", "original", "calories", "calorie", "total",
];

/// Token sequence for one food name, always at least two tokens long.
pub type TokenSequence = Vec<String>;

/// How a sequence was padded, for degenerate-input reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    None,
    Duplicated,
    Placeholder,
}

pub struct Normalizer {
    stopwords: HashSet<String>,
    min_token_len: usize,
    placeholder: String,
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        let mut stopwords: HashSet<String> = get(LANGUAGE::English).into_iter().collect();
        stopwords.extend(DOMAIN_STOPWORDS.iter().map(|w| w.to_string()));
        stopwords.extend(config.extra_stopwords.iter().map(|w| w.to_lowercase()));

        Self {
            stopwords,
            min_token_len: config.min_token_len,
            placeholder: config.placeholder.clone(),
        }
    }

    /// Normalized tokens before padding. May be empty.
    pub fn tokens(&self, name: &str) -> Vec<String> {
        name.to_lowercase()
            .split(|c: char| !c.is_alphabetic())
            .filter(|t| t.chars().count() > self.min_token_len)
            .filter(|t| !self.stopwords.contains(*t))
            .map(lemmatize)
            .collect()
    }

    /// Tokens with the two-token guard applied.
    pub fn sequence(&self, name: &str) -> (TokenSequence, Padding) {
        let mut tokens = self.tokens(name);
        match tokens.len() {
            0 => (
                vec![self.placeholder.clone(), self.placeholder.clone()],
                Padding::Placeholder,
            ),
            1 => {
                tokens.push(tokens[0].clone());
                (tokens, Padding::Duplicated)
            }
            _ => (tokens, Padding::None),
        }
    }
}

/// Crude plural folding: berries → berry, tomatoes → tomato,
/// sandwiches → sandwich, eggs → egg. Leaves -ss/-us/-is endings alone.
pub fn lemmatize(token: &str) -> String {
    let len = token.len();
    if len > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..len - 3]);
    }
    if len > 4
        && (token.ends_with("oes")
            || token.ends_with("ches")
            || token.ends_with("shes")
            || token.ends_with("xes")
            || token.ends_with("sses"))
    {
        return token[..len - 2].to_string();
    }
    if len > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        return token[..len - 1].to_string();
    }
    token.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(&NormalizeConfig::default())
    }

    #[test]
    fn test_tokens_drop_units_sizes_and_short_words() {
        let n = normalizer();
        assert_eq!(
            n.tokens("Chicken Breasts, Grilled - 4 oz (Large)"),
            vec!["chicken", "breast", "grilled"]
        );
    }

    #[test]
    fn test_tokens_drop_long_unit_spellings() {
        let n = normalizer();
        assert_eq!(n.tokens("Orange Juice 8 floz"), vec!["orange", "juice"]);
        assert_eq!(n.tokens("Whole Milk, 250 milliliters"), vec!["milk"]);
        assert_eq!(n.tokens("Sparkling Water - 2 Bottles"), vec!["sparkling", "water"]);
    }

    #[test]
    fn test_lemmatize_plurals() {
        assert_eq!(lemmatize("berries"), "berry");
        assert_eq!(lemmatize("tomatoes"), "tomato");
        assert_eq!(lemmatize("sandwiches"), "sandwich");
        assert_eq!(lemmatize("eggs"), "egg");
        assert_eq!(lemmatize("hummus"), "hummus");
        assert_eq!(lemmatize("glass"), "glass");
        assert_eq!(lemmatize("glasses"), "glass");
    }

    #[test]
    fn test_single_token_is_duplicated() {
        let (seq, padding) = normalizer().sequence("Bananas");
        assert_eq!(seq, vec!["banana", "banana"]);
        assert_eq!(padding, Padding::Duplicated);
    }

    #[test]
    fn test_empty_uses_placeholder() {
        let (seq, padding) = normalizer().sequence("1 cup of the");
        assert_eq!(seq, vec!["food", "food"]);
        assert_eq!(padding, Padding::Placeholder);
    }

    #[test]
    fn test_extra_stopwords_apply() {
        let config = NormalizeConfig {
            extra_stopwords: vec!["Kirkland".to_string()],
            ..NormalizeConfig::default()
        };
        let n = Normalizer::new(&config);
        assert_eq!(n.tokens("Kirkland Almond Butter"), vec!["almond", "butter"]);
    }
}
