/// Strip surrounding whitespace, commas and underscores.
pub fn clean_str(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == '_')
}

pub fn is_blank(raw: &str) -> bool {
    clean_str(raw).is_empty()
}

/// Round to 4 decimal places.
///
/// Magnitudes of 1e15 and above carry no fractional digits and are returned
/// as-is, which also keeps the scaling from overflowing.
pub fn round4(x: f64) -> f64 {
    if !x.is_finite() || x.abs() >= 1e15 {
        return x;
    }
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_separators() {
        assert_eq!(clean_str("  Long_ "), "Long");
        assert_eq!(clean_str("_,1,234,_"), "1,234");
        assert_eq!(clean_str(" , _ "), "");
        assert!(is_blank("\t"));
    }

    #[test]
    fn rounds_to_four_places() {
        assert_eq!(round4(33.939110), 33.9391);
        assert_eq!(round4(-75.123456), -75.1235);
        assert_eq!(round4(2.0), 2.0);
    }

    #[test]
    fn huge_values_are_left_alone() {
        assert_eq!(round4(1e305), 1e305);
        assert_eq!(round4(-1.7e308), -1.7e308);
        assert_eq!(round4(1e15 + 0.5), 1e15 + 0.5);
        assert!(round4(f64::MAX).is_finite());
    }
}
