//! Localized price text -> number.

use thiserror::Error;

use crate::normalize::normalize;

const CURRENCY_SYMBOLS: [char; 3] = ['€', '$', '£'];
const CURRENCY_CODES: [&str; 4] = ["euros", "eur", "usd", "gbp"];
const UNAVAILABLE_MARKERS: [&str; 7] = [
    "agotado",
    "sin stock",
    "no disponible",
    "fuera de stock",
    "sold out",
    "out of stock",
    "unavailable",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedPrice {
    Amount(f64),
    /// The listing exists but is sold out.
    Unavailable,
}

impl ParsedPrice {
    pub fn amount(self) -> Option<f64> {
        match self {
            ParsedPrice::Amount(value) => Some(value),
            ParsedPrice::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    #[error("malformed price text {raw:?}")]
    Malformed { raw: String },
}

pub fn parse_price(raw: &str) -> Result<ParsedPrice, PriceParseError> {
    let marker_text = normalize(raw).split_whitespace().collect::<Vec<_>>().join(" ");
    if UNAVAILABLE_MARKERS.iter().any(|m| marker_text.contains(m)) {
        return Ok(ParsedPrice::Unavailable);
    }

    let malformed = || PriceParseError::Malformed {
        raw: raw.to_string(),
    };

    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect::<String>()
        .to_lowercase();
    for code in CURRENCY_CODES {
        cleaned = cleaned.replace(code, "");
    }

    if !cleaned.chars().any(|c| c.is_ascii_digit())
        || !cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return Err(malformed());
    }

    let value: f64 = unify_separators(&cleaned).parse().map_err(|_| malformed())?;
    if !value.is_finite() {
        return Err(malformed());
    }
    Ok(ParsedPrice::Amount(value))
}

/// Rewrites `digits[.,]digits` into a plain `digits.digits` literal.
fn unify_separators(cleaned: &str) -> String {
    match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) => {
            if comma > dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (Some(_), None) => single_separator(cleaned, ','),
        (None, Some(_)) => single_separator(cleaned, '.'),
        (None, None) => cleaned.to_string(),
    }
}

fn single_separator(cleaned: &str, sep: char) -> String {
    let occurrences = cleaned.matches(sep).count();
    let trailing_digits = cleaned.rsplit(sep).next().map_or(0, str::len);
    if occurrences > 1 || trailing_digits == 3 {
        cleaned.replace(sep, "")
    } else {
        cleaned.replace(sep, ".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(raw: &str) -> f64 {
        match parse_price(raw) {
            Ok(ParsedPrice::Amount(v)) => v,
            other => panic!("expected amount for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn european_thousands_and_decimal() {
        assert_eq!(amount("1.234,56€"), 1234.56);
        assert_eq!(amount("1.234,56 €"), 1234.56);
        assert_eq!(amount("€1,234.56"), 1234.56);
    }

    #[test]
    fn single_separator_heuristics() {
        assert_eq!(amount("99,99 €"), 99.99);
        assert_eq!(amount("€99.5"), 99.5);
        assert_eq!(amount("1.234 €"), 1234.0);
        assert_eq!(amount("1.234.567"), 1234567.0);
        assert_eq!(amount("12,00"), 12.0);
    }

    #[test]
    fn strips_non_breaking_spaces_and_codes() {
        assert_eq!(amount("1\u{a0}234,50\u{a0}€"), 1234.5);
        assert_eq!(amount("250\u{202f}EUR"), 250.0);
        assert_eq!(amount("£ 80"), 80.0);
        assert_eq!(amount("100"), 100.0);
        assert_eq!(amount("120 euros"), 120.0);
    }

    #[test]
    fn sold_out_markers_are_a_sentinel() {
        assert_eq!(parse_price("¡Agotado!"), Ok(ParsedPrice::Unavailable));
        assert_eq!(parse_price("Sin  stock"), Ok(ParsedPrice::Unavailable));
        assert_eq!(parse_price("SOLD OUT"), Ok(ParsedPrice::Unavailable));
        assert_eq!(ParsedPrice::Unavailable.amount(), None);
    }

    #[test]
    fn malformed_text_is_an_error_not_zero() {
        for raw in ["not a price", "", "   ", "€", "12abc", "-5", "1.2.3,4,5", "N/A"] {
            assert!(
                matches!(parse_price(raw), Err(PriceParseError::Malformed { .. })),
                "{raw:?} should be malformed"
            );
        }
    }
}
