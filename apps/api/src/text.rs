//! Small text utilities shared by the normalizer and the résumé parser.

use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound for a believable years-of-experience figure.
pub const MAX_PLAUSIBLE_YEARS: u32 = 50;

const NUMBER: &str = r"(\d{1,2}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|fifteen|twenty)";

static EXPERIENCE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // "7 years of progressively responsible experience", "five (5) years experience"
        format!(
            r"(?i)\b{NUMBER}\s*\+?\s*(?:\(\d{{1,2}}\)\s*)?years?\s+(?:of\s+)?(?:[\w-]+\s+){{0,3}}?experience"
        ),
        // "experience of 10 years"
        format!(r"(?i)\bexperience\s+of\s+(?:at\s+least\s+)?{NUMBER}\s*\+?\s*years?"),
        // "at least 5 years", "minimum of 2 years"
        format!(
            r"(?i)\b(?:minimum|at\s+least)\s+(?:of\s+)?{NUMBER}\s*\+?\s*(?:\(\d{{1,2}}\)\s*)?years?"
        ),
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Largest plausible "N years"-style figure in `text`.
pub fn experience_years(text: &str) -> Option<u32> {
    EXPERIENCE_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1).and_then(|m| parse_number(m.as_str())))
        .filter(|years| *years <= MAX_PLAUSIBLE_YEARS)
        .max()
}

fn parse_number(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let n = match raw.to_ascii_lowercase().as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "fifteen" => 15,
        "twenty" => 20,
        _ => return None,
    };
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_experience_phrasings() {
        assert_eq!(experience_years("at least 5 years in the field"), Some(5));
        assert_eq!(
            experience_years("7 years of progressively responsible experience"),
            Some(7)
        );
        assert_eq!(experience_years("A minimum of 2 years is required"), Some(2));
        assert_eq!(experience_years("experience of 10 years"), Some(10));
        assert_eq!(experience_years("5+ years experience with Python"), Some(5));
        assert_eq!(experience_years("Ten (10) years of relevant experience"), Some(10));
    }

    #[test]
    fn test_experience_takes_the_maximum() {
        let text = "3 years of experience in M&E; 8 years of experience in project management";
        assert_eq!(experience_years(text), Some(8));
    }

    #[test]
    fn test_implausible_values_ignored() {
        assert_eq!(experience_years("at least 75 years"), None);
        assert_eq!(experience_years("75 years of experience, 4 years of experience"), Some(4));
    }

    #[test]
    fn test_no_experience_phrase() {
        assert_eq!(experience_years("Fluency in English and French"), None);
    }
}
