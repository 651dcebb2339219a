use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Ordered education vocabulary. Comparison follows the academic ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    HighSchool,
    Bachelor,
    Master,
    Doctorate,
}

static LEVEL_PATTERNS: Lazy<Vec<(EducationLevel, Regex)>> = Lazy::new(|| {
    [
        (
            EducationLevel::Doctorate,
            r"(?i)\b(ph\.?\s?d|doctorate|doctoral|d\.phil)\b",
        ),
        (
            EducationLevel::Master,
            r"(?i)\b(master'?s?|msc|m\.sc|mba|mph|llm|advanced university degree)\b",
        ),
        (
            EducationLevel::Bachelor,
            r"(?i)\b(bachelor'?s?|bsc|b\.sc|undergraduate|first[- ]level university degree)\b",
        ),
        (
            EducationLevel::HighSchool,
            r"(?i)\b(high school|secondary school|secondary education)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(level, pattern)| Regex::new(pattern).ok().map(|re| (level, re)))
    .collect()
});

impl EducationLevel {
    pub fn label(&self) -> &'static str {
        match self {
            EducationLevel::HighSchool => "High School",
            EducationLevel::Bachelor => "Bachelor's",
            EducationLevel::Master => "Master's",
            EducationLevel::Doctorate => "Doctorate",
        }
    }

    /// Highest level mentioned anywhere in `text`.
    pub fn highest_in(text: &str) -> Option<Self> {
        // Patterns are ordered from highest to lowest.
        LEVEL_PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(level, _)| *level)
    }
}

impl fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
