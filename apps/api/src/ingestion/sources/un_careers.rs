//! UN Secretariat careers portal (careers.un.org).
//!
//! Listing: job-opening cards, `?page=N` until a page comes back empty.
//! Detail: title, sectioned body (`h2` headings) and a `dl` metadata list.

use scraper::{ElementRef, Html};

use super::html::{absolute_url, element_text, first_attr, first_text, last_path_segment, sel};
use crate::ingestion::extractor::{ExtractError, ListingEntry, ListingPage, SourceExtractor};
use crate::ingestion::models::{field, RawRecord, SkippedRecord};
use crate::models::job::Organization;

pub const DEFAULT_BASE_URL: &str = "https://careers.un.org";

pub struct UnCareersExtractor {
    base_url: String,
}

impl UnCareersExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl SourceExtractor for UnCareersExtractor {
    fn organization(&self) -> Organization {
        Organization::Un
    }

    fn listing_url(&self, page: u32) -> Option<String> {
        Some(format!("{}/jobopening?page={page}", self.base_url))
    }

    fn parse_listing(&self, body: &str) -> Result<ListingPage, ExtractError> {
        let document = Html::parse_document(body);
        let card_sel = sel("div.job-card")?;
        let link_sel = sel("a.job-title")?;
        let location_sel = sel(".job-location")?;
        let grade_sel = sel(".job-grade")?;
        let deadline_sel = sel(".job-deadline")?;
        let posted_sel = sel(".job-posted")?;
        let category_sel = sel(".job-category")?;

        let mut page = ListingPage {
            has_next: true,
            ..ListingPage::default()
        };

        for card in document.select(&card_sel) {
            let href = first_attr(card, &link_sel, "href");
            let source_id = card
                .value()
                .attr("data-job-id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .or_else(|| href.and_then(last_path_segment));

            let Some(source_id) = source_id else {
                page.skipped.push(SkippedRecord {
                    source_id: None,
                    reason: "job card without an id".into(),
                });
                continue;
            };
            let Some(url) = href.and_then(|h| absolute_url(&self.base_url, h)) else {
                page.skipped.push(SkippedRecord {
                    source_id: Some(source_id),
                    reason: "job card without a detail link".into(),
                });
                continue;
            };

            let mut entry = ListingEntry::new(source_id, url);
            let fields = [
                (field::TITLE, &link_sel),
                (field::LOCATION, &location_sel),
                (field::GRADE, &grade_sel),
                (field::DEADLINE, &deadline_sel),
                (field::POSTED_DATE, &posted_sel),
                (field::CATEGORY, &category_sel),
            ];
            for (name, selector) in fields {
                if let Some(value) = first_text(card, selector) {
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
        let title_sel = sel("h1")?;
        let content_sel = sel(".job-content section")?;
        let heading_sel = sel("h2")?;
        let details_sel = sel("dl.job-details dt, dl.job-details dd")?;
        let apply_sel = sel("a.apply-button")?;

        let sections: Vec<ElementRef<'_>> = root.select(&content_sel).collect();
        if sections.is_empty() {
            return Err(ExtractError::record(
                &entry.source_id,
                "detail page has no job content",
            ));
        }

        let mut record = entry.to_record();
        if let Some(title) = first_text(root, &title_sel) {
            record.set(field::TITLE, title);
        }

        let mut qualifications = Vec::new();
        let mut description = Vec::new();
        for section in sections {
            let heading = first_text(section, &heading_sel)
                .unwrap_or_default()
                .to_lowercase();
            let text = section_body(section);
            if text.is_empty() {
                continue;
            }
            match heading.as_str() {
                h if h.contains("responsibilit") => record.set(field::RESPONSIBILITIES, &text),
                h if h.contains("language") => record.set(field::LANGUAGES, &text),
                h if h.contains("education") => {
                    record.set(field::EDUCATION, &text);
                    qualifications.push(text);
                }
                h if h.contains("experience") => {
                    record.set(field::EXPERIENCE, &text);
                    qualifications.push(text);
                }
                h if h.contains("qualification") || h.contains("competenc") => {
                    qualifications.push(text)
                }
                _ => description.push(text),
            }
        }
        if !description.is_empty() {
            record.set(field::DESCRIPTION, description.join("\n\n"));
        }
        if !qualifications.is_empty() {
            record.set(field::QUALIFICATIONS, qualifications.join("\n\n"));
        }

        let mut label = String::new();
        for item in root.select(&details_sel) {
            let text = element_text(item);
            if item.value().name() == "dt" {
                label = text.to_lowercase();
                continue;
            }
            if let Some(name) = metadata_field(&label) {
                record.set(name, text);
            }
        }

        if let Some(href) = first_attr(root, &apply_sel, "href") {
            if let Some(url) = absolute_url(&self.base_url, href) {
                record.set(field::APPLY_URL, url);
            }
        }

        Ok(record)
    }
}

/// Section text without its heading.
fn section_body(section: ElementRef<'_>) -> String {
    section
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() != "h2")
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn metadata_field(label: &str) -> Option<&'static str> {
    let name = match label {
        l if l.contains("grade") || l.contains("level") => field::GRADE,
        l if l.contains("duty station") => field::DUTY_STATION,
        l if l.contains("location") => field::LOCATION,
        l if l.contains("deadline") || l.contains("closing") => field::DEADLINE,
        l if l.contains("posted") || l.contains("posting date") => field::POSTED_DATE,
        l if l.contains("network") || l.contains("category") || l.contains("family") => {
            field::CATEGORY
        }
        l if l.contains("contract") || l.contains("appointment") => field::CONTRACT_TYPE,
        l if l.contains("remote") || l.contains("telecommut") => field::REMOTE,
        _ => return None,
    };
    Some(name)
}
