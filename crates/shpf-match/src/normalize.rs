use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const ACCENTED_VOWELS: [char; 5] = ['á', 'é', 'í', 'ó', 'ú'];

fn is_kept(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || ACCENTED_VOWELS.contains(&c)
}

/// Lowercases `input` and removes every character that is not an ASCII
/// letter, a Spanish accented vowel, a digit or whitespace.
///
/// Accented vowels survive as-is; use [`strip_diacritics`] when they must be
/// folded away.
pub fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| is_kept(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Folds accents away (`"Cámara"` -> `"Camara"`). Case and punctuation are left
/// untouched. Used when building search URLs.
pub fn strip_diacritics(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_accents_and_drops_punctuation() {
        assert_eq!(normalize("Café 123!"), "café 123");
        assert_eq!(normalize("  ÁRBOL, Ñandú?  "), "árbol andú");
    }

    #[test]
    fn keeps_inner_whitespace() {
        assert_eq!(normalize("iPhone 12  -  64GB"), "iphone 12    64gb");
    }

    #[test]
    fn empty_and_symbol_only_inputs_normalize_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("¡!¿?"), "");
    }

    #[test]
    fn strip_diacritics_folds_accents_only() {
        assert_eq!(strip_diacritics("Cámara Señal"), "Camara Senal");
        assert_eq!(strip_diacritics("Café 123!"), "Cafe 123!");
    }

    #[test]
    fn the_two_operations_differ_on_accents() {
        let input = "Teléfono";
        assert_eq!(normalize(input), "teléfono");
        assert_eq!(normalize(&strip_diacritics(input)), "telefono");
    }
}
