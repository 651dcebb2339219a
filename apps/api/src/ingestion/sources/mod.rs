pub mod html;
pub mod ilo;
pub mod un_careers;
pub mod undp;
pub mod who;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ingestion::extractor::SourceExtractor;
use crate::models::job::Organization;

/// Explicit set of extractors handed to the orchestrator. One per organization.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    extractors: BTreeMap<Organization, Arc<dyn SourceExtractor>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every shipped extractor pointed at its production site.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Arc::new(un_careers::UnCareersExtractor::new(
                un_careers::DEFAULT_BASE_URL,
            )))
            .register(Arc::new(undp::UndpExtractor::new(undp::DEFAULT_BASE_URL)))
            .register(Arc::new(who::WhoExtractor::new(who::DEFAULT_BASE_URL)))
            .register(Arc::new(ilo::IloExtractor::new(ilo::DEFAULT_BASE_URL)))
    }

    /// Shipped extractors restricted to `enabled`. An empty filter keeps all.
    pub fn from_enabled(enabled: &[Organization]) -> Self {
        let mut registry = Self::with_defaults();
        if !enabled.is_empty() {
            registry.extractors.retain(|org, _| enabled.contains(org));
        }
        registry
    }

    /// Registers an extractor, replacing any previous one for its organization.
    pub fn register(mut self, extractor: Arc<dyn SourceExtractor>) -> Self {
        self.extractors.insert(extractor.organization(), extractor);
        self
    }

    pub fn get(&self, organization: Organization) -> Option<Arc<dyn SourceExtractor>> {
        self.extractors.get(&organization).cloned()
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.extractors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_register_four_sources() {
        let registry = SourceRegistry::with_defaults();
        assert_eq!(
            registry.organizations(),
            vec![
                Organization::Un,
                Organization::Undp,
                Organization::Who,
                Organization::Ilo
            ]
        );
    }

    #[test]
    fn test_enabled_filter() {
        let registry = SourceRegistry::from_enabled(&[Organization::Who, Organization::Unicef]);
        assert_eq!(registry.organizations(), vec![Organization::Who]);
        assert!(registry.get(Organization::Un).is_none());
        assert_eq!(SourceRegistry::from_enabled(&[]).len(), 4);
    }
}
