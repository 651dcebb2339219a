//! Résumé document parsing.
//!
//! Bytes in, plain text plus derived signal out: skills from the shared
//! vocabulary, an experience estimate and the highest education level.
//! Size is checked before any parsing. Everything here is blocking; callers
//! run it on the blocking pool.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use serde::Serialize;
use thiserror::Error;
use zip::ZipArchive;

use crate::matching::vocabulary::SkillVocabulary;
use crate::models::education::EducationLevel;
use crate::text::experience_years;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("file is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported file type '{0}'; upload a PDF or DOCX")]
    Unsupported(String),

    #[error("could not read the {format} file ({reason}); re-upload an undamaged copy")]
    Corrupt {
        format: &'static str,
        reason: String,
    },

    #[error("no extractable text; re-upload a text-based PDF or DOCX")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Text => "txt",
        }
    }

    /// Extension first, then magic bytes.
    pub fn detect(filename: &str, bytes: &[u8]) -> Result<Self, DocumentError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => return Ok(DocumentFormat::Pdf),
            "docx" => return Ok(DocumentFormat::Docx),
            "txt" => return Ok(DocumentFormat::Text),
            _ => {}
        }
        if bytes.starts_with(b"%PDF") {
            Ok(DocumentFormat::Pdf)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Ok(DocumentFormat::Docx)
        } else if extension.is_empty() {
            Err(DocumentError::Unsupported(filename.to_string()))
        } else {
            Err(DocumentError::Unsupported(extension))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedResume {
    pub format: DocumentFormat,
    pub text: String,
    pub skills: Vec<String>,
    pub experience_years: Option<u32>,
    pub education_level: Option<EducationLevel>,
}

/// Parses an uploaded résumé. `declared_size` is the size the client claimed,
/// if any; both it and the actual length must be within `limit`.
pub fn parse_document(
    filename: &str,
    declared_size: Option<usize>,
    bytes: &[u8],
    limit: usize,
    vocabulary: &SkillVocabulary,
) -> Result<ParsedResume, DocumentError> {
    let size = declared_size.unwrap_or(0).max(bytes.len());
    if size > limit {
        return Err(DocumentError::TooLarge { size, limit });
    }

    let format = DocumentFormat::detect(filename, bytes)?;
    let text = match format {
        DocumentFormat::Pdf => extract_pdf_text(bytes)?,
        DocumentFormat::Docx => extract_docx_text(bytes)?,
        DocumentFormat::Text => String::from_utf8_lossy(bytes).into_owned(),
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(DocumentError::Empty);
    }

    Ok(ParsedResume {
        format,
        skills: vocabulary.extract(&text).into_iter().collect(),
        experience_years: experience_years(&text),
        education_level: EducationLevel::highest_in(&text),
        text,
    })
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, DocumentError> {
    let corrupt = |reason: String| DocumentError::Corrupt {
        format: "PDF",
        reason,
    };
    // pdf-extract panics on some malformed inputs.
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| corrupt("unreadable PDF structure".into()))?
        .map_err(|e| corrupt(e.to_string()))
}

fn extract_docx_text(bytes: &[u8]) -> Result<String, DocumentError> {
    let corrupt = |reason: String| DocumentError::Corrupt {
        format: "DOCX",
        reason,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;
    let mut document = archive
        .by_name("word/document.xml")
        .map_err(|_| corrupt("missing word/document.xml".into()))?;
    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .map_err(|e| corrupt(e.to_string()))?;

    let mut reader = XmlReader::from_str(&xml);
    let mut output = String::new();
    let mut in_text_node = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = true,
                b"w:tab" => output.push('\t'),
                b"w:br" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => output.push('\t'),
                b"w:br" | b"w:p" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value = e.unescape().map_err(|err| corrupt(err.to_string()))?;
                    output.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                b"w:p" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(corrupt(err.to_string())),
            _ => {}
        }
    }

    Ok(output)
}
