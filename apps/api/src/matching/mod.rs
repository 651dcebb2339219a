//! Résumé-to-job matching: keyword vocabulary, scoring and recommendations.

pub mod handlers;
pub mod recommendations;
pub mod scoring;
pub mod vocabulary;
