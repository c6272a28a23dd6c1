//! Normalisation of free-form price text such as `"$1,234.56"` or `"1.234,56"`

/// Parses a scraped price string into a number.
///
/// Everything except digits, commas and dots is discarded. Of the remaining
/// separators, whichever comes last in the string is the decimal separator;
/// every other separator is a thousands separator and is dropped.
///
/// Returns `None` when nothing numeric is left. Callers treat that as "no
/// price", never as zero.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let decimal_at = cleaned.rfind([',', '.']);

    let normalized: String = cleaned
        .char_indices()
        .filter_map(|(i, c)| match c {
            ',' | '.' if Some(i) == decimal_at => Some('.'),
            ',' | '.' => None,
            digit => Some(digit),
        })
        .collect();

    if !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    normalized.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_decimal_with_comma_thousands() {
        assert_eq!(parse_price("$1,234.56"), Some(1234.56));
    }

    #[test]
    fn comma_decimal_with_dot_thousands() {
        assert_eq!(parse_price("1.234,56"), Some(1234.56));
        assert_eq!(parse_price("€ 1.234.567,89"), Some(1_234_567.89));
    }

    #[test]
    fn single_separator_is_decimal() {
        assert_eq!(parse_price("12,50 zł"), Some(12.5));
        assert_eq!(parse_price("USD 99.99"), Some(99.99));
    }

    #[test]
    fn repeated_separator_keeps_only_the_last() {
        assert_eq!(parse_price("1,234,567"), Some(1234.567));
    }

    #[test]
    fn plain_digits() {
        for raw in ["0", "7", "42", "1999", "000120"] {
            let expected: f64 = raw.parse().unwrap();
            assert_eq!(parse_price(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_price("Now only 250 kr"), Some(250.0));
    }

    #[test]
    fn unparseable_inputs() {
        assert_eq!(parse_price("N/A"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("Price on request"), None);
        assert_eq!(parse_price(".,"), None);
    }

    #[test]
    fn trailing_separator() {
        assert_eq!(parse_price("15."), Some(15.0));
        assert_eq!(parse_price("15,-"), Some(15.0));
    }
}
