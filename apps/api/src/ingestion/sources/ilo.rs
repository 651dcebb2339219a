//! ILO vacancies (jobs.ilo.org). Paginated while a "next" link is present;
//! each vacancy has a detail page.

use scraper::Html;

use super::html::{absolute_url, first_attr, first_text, last_path_segment, sel};
use crate::ingestion::extractor::{ExtractError, ListingEntry, ListingPage, SourceExtractor};
use crate::ingestion::models::{field, RawRecord, SkippedRecord};
use crate::models::job::Organization;

pub const DEFAULT_BASE_URL: &str = "https://jobs.ilo.org";

pub struct IloExtractor {
    base_url: String,
}

impl IloExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl SourceExtractor for IloExtractor {
    fn organization(&self) -> Organization {
        Organization::Ilo
    }

    fn listing_url(&self, page: u32) -> Option<String> {
        Some(format!("{}/vacancies?page={page}", self.base_url))
    }

    fn parse_listing(&self, body: &str) -> Result<ListingPage, ExtractError> {
        let document = Html::parse_document(body);
        let vacancy_sel = sel("article.vacancy")?;
        let link_sel = sel("h3 a[href]")?;
        let location_sel = sel(".location")?;
        let grade_sel = sel(".grade")?;
        let deadline_sel = sel(".closing-date")?;
        let next_sel = sel("a[rel=next], a.next")?;

        let mut page = ListingPage {
            has_next: document.select(&next_sel).next().is_some(),
            ..ListingPage::default()
        };

        for vacancy in document.select(&vacancy_sel) {
            let data_id = vacancy
                .value()
                .attr("data-id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            let href = first_attr(vacancy, &link_sel, "href");
            let Some(href) = href else {
                page.skipped.push(SkippedRecord {
                    source_id: data_id,
                    reason: "vacancy without a link".into(),
                });
                continue;
            };
            let source_id = data_id.or_else(|| last_path_segment(href));
            let (Some(source_id), Some(url)) = (source_id, absolute_url(&self.base_url, href))
            else {
                page.skipped.push(SkippedRecord {
                    source_id: None,
                    reason: format!("unusable vacancy link '{href}'"),
                });
                continue;
            };

            let mut entry = ListingEntry::new(source_id, url);
            let fields = [
                (field::TITLE, &link_sel),
                (field::LOCATION, &location_sel),
                (field::GRADE, &grade_sel),
                (field::DEADLINE, &deadline_sel),
            ];
            for (name, selector) in fields {
                if let Some(value) = first_text(vacancy, selector) {
                    entry.set(name, value);
                }
            }
            page.entries.push(entry);
        }

        Ok(page)
    }

    fn detail_url(&self, entry: &ListingEntry) -> Option<String> {
        Some(entry.url.clone())
    }

    fn parse_detail(&self, entry: &ListingEntry, body: &str) -> Result<RawRecord, ExtractError> {
        let document = Html::parse_document(body);
        let root = document.root_element();
        let description_sel = sel("div.job-description, div#job-details")?;

        let Some(description) = first_text(root, &description_sel) else {
            return Err(ExtractError::record(
                &entry.source_id,
                "detail page has no job description",
            ));
        };

        let mut record = entry.to_record();
        record.set(field::DESCRIPTION, description);

        let detail_fields = [
            (field::TITLE, "h1"),
            (field::RESPONSIBILITIES, ".duties"),
            (field::QUALIFICATIONS, ".qualifications"),
            (field::EDUCATION, ".education"),
            (field::LANGUAGES, ".languages"),
            (field::CONTRACT_TYPE, ".contract-type"),
            (field::DEADLINE, ".closing-date"),
            (field::CATEGORY, ".category"),
            (field::DUTY_STATION, ".duty-station"),
            (field::GRADE, ".grade"),
        ];
        for (name, css) in detail_fields {
            if let Some(value) = first_text(root, &sel(css)?) {
                record.set(name, strip_label(&value));
            }
        }

        Ok(record)
    }
}

/// Drops a leading "Label:" prefix such as "Closing date: 15 March 2026".
fn strip_label(value: &str) -> &str {
    match value.split_once(':') {
        Some((label, rest))
            if label.split_whitespace().count() <= 3
                && !rest.trim().is_empty()
                && !label.chars().any(|c| c.is_ascii_digit()) =>
        {
            rest.trim()
        }
        _ => value,
    }
}
