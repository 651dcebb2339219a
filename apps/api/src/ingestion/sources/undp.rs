//! UNDP jobs table. A single listing page; every field comes from the row.

use scraper::Html;

use super::html::{absolute_url, element_text, first_attr, last_path_segment, sel};
use crate::ingestion::extractor::{ExtractError, ListingEntry, ListingPage, SourceExtractor};
use crate::ingestion::models::{field, SkippedRecord};
use crate::models::job::Organization;

pub const DEFAULT_BASE_URL: &str = "https://jobs.undp.org";

pub struct UndpExtractor {
    base_url: String,
}

impl UndpExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl SourceExtractor for UndpExtractor {
    fn organization(&self) -> Organization {
        Organization::Undp
    }

    fn listing_url(&self, page: u32) -> Option<String> {
        (page == 1).then(|| format!("{}/cj_view_jobs.cfm", self.base_url))
    }

    fn parse_listing(&self, body: &str) -> Result<ListingPage, ExtractError> {
        let document = Html::parse_document(body);
        let row_sel = sel("tr.job-row")?;
        let cell_sel = sel("td")?;
        let link_sel = sel("a[href]")?;

        let mut page = ListingPage::default();
        for row in document.select(&row_sel) {
            let cells: Vec<_> = row.select(&cell_sel).collect();
            let Some(title_cell) = cells.first().copied() else {
                page.skipped.push(SkippedRecord {
                    source_id: None,
                    reason: "job row without cells".into(),
                });
                continue;
            };

            let href = first_attr(title_cell, &link_sel, "href");
            let source_id = title_cell
                .value()
                .attr("data-id")
                .or_else(|| row.value().attr("data-id"))
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .or_else(|| href.and_then(last_path_segment));
            let Some(source_id) = source_id else {
                page.skipped.push(SkippedRecord {
                    source_id: None,
                    reason: "job row without an id".into(),
                });
                continue;
            };
            if cells.len() < 4 {
                page.skipped.push(SkippedRecord {
                    source_id: Some(source_id),
                    reason: format!("expected at least 4 cells, found {}", cells.len()),
                });
                continue;
            }
            let Some(url) = href.and_then(|h| absolute_url(&self.base_url, h)) else {
                page.skipped.push(SkippedRecord {
                    source_id: Some(source_id),
                    reason: "job row without a link".into(),
                });
                continue;
            };

            let mut entry = ListingEntry::new(source_id, url.clone());
            entry.set(field::TITLE, element_text(title_cell));
            entry.set(field::APPLY_URL, url);
            let columns = [
                field::DESCRIPTION,
                field::LOCATION,
                field::GRADE,
                field::DEADLINE,
                field::CONTRACT_TYPE,
            ];
            for (name, cell) in columns.into_iter().zip(cells.iter().skip(1)) {
                entry.set(name, element_text(*cell));
            }
            page.entries.push(entry);
        }

        Ok(page)
    }
}
