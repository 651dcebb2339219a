#![allow(dead_code)]

//! Normalizer: maps raw field candidates onto the canonical job schema.
//!
//! Pure and deterministic: the same raw record always produces the same
//! candidate. Invalid grades and unparsable dates are not errors; they are
//! dropped and reported through `FieldDrops` so the run summary can count
//! them. Only a missing id, title or URL rejects a record.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};
use serde::Serialize;

use crate::ingestion::models::{field, RawRecord};
use crate::models::education::EducationLevel;
use crate::models::job::{JobCandidate, Organization};
use crate::text::{collapse_whitespace, experience_years, MAX_PLAUSIBLE_YEARS};

// ────────────────────────────────────────────────────────────────────────────
// Outcomes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    MissingSourceId,
    MissingTitle,
    MissingUrl,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::MissingSourceId => "missing source id",
            Rejection::MissingTitle => "missing title",
            Rejection::MissingUrl => "missing apply/source URL",
        };
        f.write_str(reason)
    }
}

/// Raw values that were present but could not be normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldDrops {
    pub grade: bool,
    pub deadline: bool,
    pub posted_date: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub candidate: JobCandidate,
    pub dropped: FieldDrops,
}

// ────────────────────────────────────────────────────────────────────────────
// Record normalization
// ────────────────────────────────────────────────────────────────────────────

pub fn normalize(organization: Organization, raw: &RawRecord) -> Result<Normalized, Rejection> {
    let source_id = raw.source_id.trim();
    if source_id.is_empty() {
        return Err(Rejection::MissingSourceId);
    }

    let title = raw.get(field::TITLE).map(strip_markup).unwrap_or_default();
    if title.is_empty() {
        return Err(Rejection::MissingTitle);
    }

    let source_url = raw.source_url.trim();
    let apply_url = raw
        .get(field::APPLY_URL)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(source_url);
    if apply_url.is_empty() {
        return Err(Rejection::MissingUrl);
    }
    let source_url = if source_url.is_empty() {
        apply_url
    } else {
        source_url
    };

    let mut dropped = FieldDrops::default();

    let grade = raw.get(field::GRADE).and_then(|g| {
        let normalized = normalize_grade(g);
        dropped.grade = normalized.is_none();
        normalized
    });
    let deadline = raw.get(field::DEADLINE).and_then(|d| {
        let parsed = parse_date(d);
        dropped.deadline = parsed.is_none();
        parsed
    });
    let posted_date = raw.get(field::POSTED_DATE).and_then(|d| {
        let parsed = parse_date(d);
        dropped.posted_date = parsed.is_none();
        parsed
    });

    let description = raw
        .get(field::DESCRIPTION)
        .map(strip_markup)
        .unwrap_or_default();
    let responsibilities = optional_markup(raw.get(field::RESPONSIBILITIES));
    let qualifications = optional_markup(raw.get(field::QUALIFICATIONS));

    let location = raw
        .get(field::LOCATION)
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty())
        .or_else(|| compose_location(raw.get(field::CITY), raw.get(field::COUNTRY)));
    let duty_station = optional_plain(raw.get(field::DUTY_STATION));

    let remote_eligible = raw
        .get(field::REMOTE)
        .and_then(parse_remote)
        .unwrap_or_else(|| {
            [location.as_deref(), duty_station.as_deref()]
                .into_iter()
                .flatten()
                .any(mentions_remote)
        });

    let language_requirements = raw
        .get(field::LANGUAGES)
        .map(normalize_languages)
        .unwrap_or_default();

    let education_level = raw
        .get(field::EDUCATION)
        .and_then(EducationLevel::highest_in)
        .or_else(|| qualifications.as_deref().and_then(EducationLevel::highest_in))
        .map(|level| level.label().to_string());

    let years_of_experience = raw
        .get(field::EXPERIENCE)
        .and_then(parse_years)
        .or_else(|| qualifications.as_deref().and_then(experience_years))
        .or_else(|| experience_years(&description));

    let candidate = JobCandidate {
        source_id: source_id.to_string(),
        organization,
        title,
        description,
        responsibilities,
        qualifications,
        category: optional_plain(raw.get(field::CATEGORY)),
        grade,
        contract_type: optional_plain(raw.get(field::CONTRACT_TYPE)),
        location,
        duty_station,
        remote_eligible,
        language_requirements,
        education_level,
        years_of_experience,
        apply_url: apply_url.to_string(),
        deadline,
        posted_date,
        source_url: source_url.to_string(),
    };

    Ok(Normalized { candidate, dropped })
}

fn optional_markup(value: Option<&str>) -> Option<String> {
    value.map(strip_markup).filter(|v| !v.is_empty())
}

fn optional_plain(value: Option<&str>) -> Option<String> {
    value.map(collapse_whitespace).filter(|v| !v.is_empty())
}

fn compose_location(city: Option<&str>, country: Option<&str>) -> Option<String> {
    let parts: Vec<String> = [city, country]
        .into_iter()
        .flatten()
        .map(collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn parse_years(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(years) => (years <= MAX_PLAUSIBLE_YEARS).then_some(years),
        Err(_) => experience_years(raw),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Grades
// ────────────────────────────────────────────────────────────────────────────

static NUMBERED_GRADE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^(GS|FS|P|G|D|L)\s*-?\s*(\d{1,2})$").ok());
// National officer grades run A to E. Without a dash the letter must be
// spaced off or upper-case, so words like "Not" or "nor" stay free text.
static NATIONAL_OFFICER_GRADE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:(?i:NO)\s*-\s*([A-Ea-e])|(?i:NO)\s+([A-Ea-e])|NO([A-E]))$").ok()
});

/// Canonical grade, or `None` when the value is not a recognised UN grade.
pub fn normalize_grade(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("ungraded") {
        return Some("Ungraded".to_string());
    }
    if let Some(caps) = NUMBERED_GRADE.as_ref().and_then(|re| re.captures(value)) {
        let level: u8 = caps[2].parse().ok()?;
        return Some(format!("{}-{level}", caps[1].to_ascii_uppercase()));
    }
    let caps = NATIONAL_OFFICER_GRADE.as_ref()?.captures(value)?;
    let letter = caps.iter().skip(1).flatten().next()?;
    Some(format!("NO-{}", letter.as_str().to_ascii_uppercase()))
}

// ────────────────────────────────────────────────────────────────────────────
// Dates
// ────────────────────────────────────────────────────────────────────────────

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const MONTH: &str = "(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\\.?";

static EMBEDDED_DATES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2})?(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)?".to_string(),
        r"\d{1,2}[/.-]\d{1,2}[/.-]\d{4}".to_string(),
        format!(r"(?i)\b\d{{1,2}}[- ]{MONTH}[- ]\d{{4}}"),
        format!(r"(?i)\b{MONTH} \d{{1,2}},? \d{{4}}"),
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Parses the accepted date shapes, also when embedded in surrounding text.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = collapse_whitespace(raw);
    if value.is_empty() {
        return None;
    }
    parse_exact(&value).or_else(|| {
        EMBEDDED_DATES
            .iter()
            .flat_map(|re| re.find_iter(&value))
            .find_map(|m| parse_exact(m.as_str()))
    })
}

fn parse_exact(value: &str) -> Option<NaiveDate> {
    let value = value.trim().trim_end_matches('.');
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
    {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
}

// ────────────────────────────────────────────────────────────────────────────
// Text
// ────────────────────────────────────────────────────────────────────────────

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "td", "th", "table", "section", "h1", "h2", "h3",
    "h4", "h5", "h6", "dt", "dd",
];

/// HTML to plain text: tags removed, entities decoded, whitespace collapsed.
pub fn strip_markup(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return collapse_whitespace(raw);
    }

    let fragment = Html::parse_fragment(raw);
    let mut out = String::with_capacity(raw.len());
    for node in fragment.tree.root().descendants() {
        match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element())
                    .map(|e| matches!(e.name(), "script" | "style"))
                    .unwrap_or(false);
                if !hidden {
                    out.push_str(text);
                }
            }
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => out.push(' '),
            _ => {}
        }
    }
    collapse_whitespace(&out)
}

// ────────────────────────────────────────────────────────────────────────────
// Remote eligibility
// ────────────────────────────────────────────────────────────────────────────

pub fn parse_remote(raw: &str) -> Option<bool> {
    let value = raw.trim().to_lowercase();
    match value.as_str() {
        "yes" | "y" | "true" | "1" | "remote" | "home-based" | "home based" | "telecommute" => {
            Some(true)
        }
        "no" | "n" | "false" | "0" | "on-site" | "onsite" | "office-based" => Some(false),
        other if mentions_remote(other) => Some(true),
        _ => None,
    }
}

fn mentions_remote(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("remote") || lower.contains("home-based") || lower.contains("home based")
}

// ────────────────────────────────────────────────────────────────────────────
// Languages
// ────────────────────────────────────────────────────────────────────────────

pub const REQUIRED: &str = "required";
pub const DESIRABLE: &str = "desirable";
pub const FLUENT: &str = "fluent";
pub const WORKING_KNOWLEDGE: &str = "working knowledge";

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("ar", "Arabic"),
    ("zh", "Chinese"),
    ("ru", "Russian"),
    ("pt", "Portuguese"),
    ("de", "German"),
    ("sw", "Swahili"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("hi", "Hindi"),
];

// Checked in order; the first group with a hit wins.
const LEVEL_SYNONYMS: &[(&str, &[&str])] = &[
    (
        DESIRABLE,
        &["desirable", "preferred", "an asset", "asset", "advantage", "a plus"],
    ),
    (REQUIRED, &["required", "essential", "mandatory", "must"]),
    (
        FLUENT,
        &[
            "fluent",
            "fluency",
            "excellent",
            "full proficiency",
            "expert",
            "native",
            "mother tongue",
        ],
    ),
    (
        WORKING_KNOWLEDGE,
        &["working knowledge", "knowledge of", "intermediate", "good command"],
    ),
];

static LANGUAGE_MENTION: Lazy<Option<Regex>> = Lazy::new(|| {
    let names: Vec<&str> = LANGUAGES.iter().map(|(_, name)| *name).collect();
    Regex::new(&format!(r"(?i)\b({})\b", names.join("|"))).ok()
});

/// Language name for a name or ISO 639-1 code, case-insensitively.
pub fn canonical_language(raw: &str) -> Option<&'static str> {
    let value = raw.trim();
    LANGUAGES
        .iter()
        .find(|(code, name)| code.eq_ignore_ascii_case(value) || name.eq_ignore_ascii_case(value))
        .map(|(_, name)| *name)
}

/// Maps a proficiency phrase to the canonical vocabulary, or returns it as given.
pub fn normalize_level(raw: &str) -> String {
    let value = collapse_whitespace(raw);
    let lower = value.to_lowercase();
    LEVEL_SYNONYMS
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|s| contains_phrase(&lower, s)))
        .map(|(level, _)| level.to_string())
        .unwrap_or(value)
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Language → proficiency from either "Language: level" pairs or free text.
/// A language listed without any proficiency is treated as required.
pub fn normalize_languages(raw: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for segment in raw.split([';', '\n', '.']) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let parts: Vec<&str> = if segment.matches(':').count() > 1 {
            segment.split(',').collect()
        } else {
            vec![segment]
        };
        for part in parts {
            read_language_part(part.trim(), &mut out);
        }
    }
    out
}

fn read_language_part(part: &str, out: &mut BTreeMap<String, String>) {
    if let Some((name, level)) = part.split_once(':') {
        if let Some(language) = canonical_language(name) {
            let level = level.trim();
            let level = if level.is_empty() {
                REQUIRED.to_string()
            } else {
                normalize_level(level)
            };
            out.entry(language.to_string()).or_insert(level);
            return;
        }
    }
    if let Some(language) = canonical_language(part) {
        out.entry(language.to_string())
            .or_insert_with(|| REQUIRED.to_string());
        return;
    }

    let Some(re) = LANGUAGE_MENTION.as_ref() else {
        return;
    };
    let mentioned: Vec<&'static str> = re
        .find_iter(part)
        .filter_map(|m| canonical_language(m.as_str()))
        .collect();
    if mentioned.is_empty() {
        return;
    }
    let lower = part.to_lowercase();
    let level = LEVEL_SYNONYMS
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|s| contains_phrase(&lower, s)))
        .map(|(level, _)| *level)
        .unwrap_or(REQUIRED);
    for language in mentioned {
        out.entry(language.to_string())
            .or_insert_with(|| level.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, fields: &[(&str, &str)]) -> RawRecord {
        let mut record = RawRecord::new(id, format!("https://careers.un.org/job/{id}"));
        for (name, value) in fields {
            record.set(name, value);
        }
        record
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_grade_filtering() {
        assert_eq!(normalize_grade("2024-01-01"), None);
        assert_eq!(normalize_grade("P-3").as_deref(), Some("P-3"));
        assert_eq!(normalize_grade("p-3").as_deref(), Some("P-3"));
        assert_eq!(normalize_grade("P 3").as_deref(), Some("P-3"));
        assert_eq!(normalize_grade("P4").as_deref(), Some("P-4"));
        assert_eq!(normalize_grade("gs-5").as_deref(), Some("GS-5"));
        assert_eq!(normalize_grade("NO-b").as_deref(), Some("NO-B"));
        assert_eq!(normalize_grade("FS - 6").as_deref(), Some("FS-6"));
        assert_eq!(normalize_grade("ungraded").as_deref(), Some("Ungraded"));
        assert_eq!(normalize_grade("N/A"), None);
        assert_eq!(normalize_grade("Consultant"), None);
    }

    #[test]
    fn test_national_officer_grade_needs_a_real_letter() {
        assert_eq!(normalize_grade("NO-C").as_deref(), Some("NO-C"));
        assert_eq!(normalize_grade("no - d").as_deref(), Some("NO-D"));
        assert_eq!(normalize_grade("NOA").as_deref(), Some("NO-A"));
        assert_eq!(normalize_grade("NO E").as_deref(), Some("NO-E"));
        for word in ["Not", "Now", "nor", "NOT", "NO-F", "noa"] {
            assert_eq!(normalize_grade(word), None, "{word}");
        }
    }

    #[test]
    fn test_numbered_grade_drops_leading_zero() {
        assert_eq!(normalize_grade("G-05").as_deref(), Some("G-5"));
        assert_eq!(normalize_grade("P 04").as_deref(), Some("P-4"));
        assert_eq!(normalize_grade("D-1").as_deref(), Some("D-1"));
    }

    #[test]
    fn test_date_formats() {
        let expected = date(2025, 12, 31);
        for raw in [
            "2025-12-31",
            "31/12/2025",
            "31-Dec-2025",
            "31-December-2025",
            "31 December 2025",
            "December 31, 2025",
            "Dec 31, 2025",
            "2025-12-31T23:59:00Z",
            "Deadline: 31 December 2025",
            "Closing on 2025-12-31 (midnight New York time)",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "failed on {raw}");
        }
        assert_eq!(parse_date("N/A"), None);
        assert_eq!(parse_date("open until filled"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<p>Provide <b>technical</b> support &amp; guidance.</p><ul><li>One</li><li>Two</li></ul>"),
            "Provide technical support & guidance. One Two"
        );
        assert_eq!(strip_markup("  plain\n text "), "plain text");
        assert_eq!(strip_markup("<style>p{}</style><p>Body</p>"), "Body");
    }

    #[test]
    fn test_language_pairs() {
        let langs = normalize_languages("English: Expert; French: Intermediate; es: essential");
        assert_eq!(langs.get("English").map(String::as_str), Some(FLUENT));
        assert_eq!(langs.get("French").map(String::as_str), Some(WORKING_KNOWLEDGE));
        assert_eq!(langs.get("Spanish").map(String::as_str), Some(REQUIRED));
    }

    #[test]
    fn test_language_sentences() {
        let langs = normalize_languages(
            "Fluency in English is required. Knowledge of French is desirable. Arabic is an asset.",
        );
        assert_eq!(langs.get("English").map(String::as_str), Some(REQUIRED));
        assert_eq!(langs.get("French").map(String::as_str), Some(DESIRABLE));
        assert_eq!(langs.get("Arabic").map(String::as_str), Some(DESIRABLE));
    }

    #[test]
    fn test_unrecognized_level_preserved() {
        let langs = normalize_languages("Russian: Level B2 (CEFR)");
        assert_eq!(langs.get("Russian").map(String::as_str), Some("Level B2 (CEFR)"));
    }

    #[test]
    fn test_comma_separated_pairs() {
        let langs = normalize_languages("en: Fluent, fr: Mandatory");
        assert_eq!(langs.get("English").map(String::as_str), Some(FLUENT));
        assert_eq!(langs.get("French").map(String::as_str), Some(REQUIRED));
    }

    #[test]
    fn test_remote_markers() {
        assert_eq!(parse_remote("Yes"), Some(true));
        assert_eq!(parse_remote("false"), Some(false));
        assert_eq!(parse_remote("Home-based"), Some(true));
        assert_eq!(parse_remote("maybe"), None);
    }

    #[test]
    fn test_normalize_full_record() {
        let record = raw(
            "241001",
            &[
                (field::TITLE, "Programme Officer"),
                (field::DESCRIPTION, "<p>Lead the <b>programme</b>.</p>"),
                (field::QUALIFICATIONS, "Advanced university degree. At least 5 years of relevant experience."),
                (field::GRADE, "p-3"),
                (field::DEADLINE, "31-Dec-2025"),
                (field::CITY, "Nairobi"),
                (field::COUNTRY, "Kenya"),
                (field::LANGUAGES, "English: required"),
            ],
        );
        let normalized = normalize(Organization::Un, &record).unwrap();
        let job = normalized.candidate;
        assert_eq!(job.grade.as_deref(), Some("P-3"));
        assert_eq!(job.deadline, Some(date(2025, 12, 31)));
        assert_eq!(job.location.as_deref(), Some("Nairobi, Kenya"));
        assert_eq!(job.description, "Lead the programme.");
        assert_eq!(job.years_of_experience, Some(5));
        assert_eq!(job.education_level.as_deref(), Some("Master's"));
        assert_eq!(job.apply_url, "https://careers.un.org/job/241001");
        assert_eq!(normalized.dropped, FieldDrops::default());
    }

    #[test]
    fn test_invalid_values_dropped_and_counted() {
        let record = raw(
            "2",
            &[
                (field::TITLE, "Driver"),
                (field::GRADE, "2024-01-01"),
                (field::DEADLINE, "N/A"),
            ],
        );
        let normalized = normalize(Organization::Un, &record).unwrap();
        assert_eq!(normalized.candidate.grade, None);
        assert_eq!(normalized.candidate.deadline, None);
        assert!(normalized.dropped.grade);
        assert!(normalized.dropped.deadline);
        assert!(!normalized.dropped.posted_date);
    }

    #[test]
    fn test_rejections() {
        let no_title = raw("1", &[]);
        assert_eq!(
            normalize(Organization::Un, &no_title).unwrap_err(),
            Rejection::MissingTitle
        );

        let no_id = raw("  ", &[(field::TITLE, "A")]);
        assert_eq!(
            normalize(Organization::Un, &no_id).unwrap_err(),
            Rejection::MissingSourceId
        );

        let mut no_url = raw("1", &[(field::TITLE, "A")]);
        no_url.source_url = String::new();
        assert_eq!(
            normalize(Organization::Un, &no_url).unwrap_err(),
            Rejection::MissingUrl
        );
    }

    #[test]
    fn test_renormalization_is_idempotent() {
        let record = raw(
            "9",
            &[
                (field::TITLE, "Data Analyst"),
                (field::DESCRIPTION, "SQL &amp; Python"),
                (field::POSTED_DATE, "01/11/2025"),
            ],
        );
        let first = normalize(Organization::Who, &record).unwrap();
        let second = normalize(Organization::Who, &record).unwrap();
        assert_eq!(first, second);
    }
}
