//! Contributor registry.

use std::sync::Arc;

use tracing::debug;

use crate::contributor::TemplateContributor;
use crate::error::{CoreError, CoreResult};

/// An ordered registry of template contributors.
///
/// Registration order is the order modules appear in generated templates,
/// so it must be stable across runs.
#[derive(Default)]
pub struct ContributorRegistry {
    contributors: Vec<Arc<dyn TemplateContributor>>,
}

impl ContributorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            contributors: Vec::new(),
        }
    }

    /// Register a contributor.
    ///
    /// A contributor with an already registered id replaces the previous one
    /// in place, keeping its position.
    pub fn register(&mut self, contributor: Arc<dyn TemplateContributor>) {
        let id = contributor.id().to_string();
        if let Some(slot) = self.contributors.iter_mut().find(|c| c.id() == id) {
            debug!("Replacing contributor: {}", id);
            *slot = contributor;
        } else {
            debug!("Registering contributor: {}", id);
            self.contributors.push(contributor);
        }
    }

    /// Get a contributor by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn TemplateContributor>> {
        self.contributors.iter().find(|c| c.id() == id).cloned()
    }

    /// Get a contributor by id, returning an error if not found.
    pub fn get_required(&self, id: &str) -> CoreResult<Arc<dyn TemplateContributor>> {
        self.get(id)
            .ok_or_else(|| CoreError::ContributorNotFound(id.to_string()))
    }

    /// Check if a contributor is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.contributors.iter().any(|c| c.id() == id)
    }

    /// Contributor ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.contributors.iter().map(|c| c.id()).collect()
    }

    /// Iterate contributors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TemplateContributor>> {
        self.contributors.iter()
    }

    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }

    /// Remove a contributor from the registry.
    pub fn unregister(&mut self, id: &str) -> Option<Arc<dyn TemplateContributor>> {
        debug!("Unregistering contributor: {}", id);
        let index = self.contributors.iter().position(|c| c.id() == id)?;
        Some(self.contributors.remove(index))
    }
}

impl std::fmt::Debug for ContributorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContributorRegistry")
            .field("contributors", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contributor::{ContributionContext, Stage, TemplateContribution};
    use async_trait::async_trait;

    struct TestContributor {
        id: String,
        marker: &'static str,
    }

    #[async_trait]
    impl TemplateContributor for TestContributor {
        fn id(&self) -> &str {
            &self.id
        }

        fn supported_stages(&self) -> &[Stage] {
            &[Stage::Provision]
        }

        async fn contribute(&self, _ctx: &ContributionContext) -> CoreResult<Option<TemplateContribution>> {
            Ok(Some(TemplateContribution::new().with_parameter("marker", self.marker)))
        }
    }

    fn contributor(id: &str, marker: &'static str) -> Arc<dyn TemplateContributor> {
        Arc::new(TestContributor {
            id: id.to_string(),
            marker,
        })
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let mut registry = ContributorRegistry::new();
        assert!(registry.is_empty());

        registry.register(contributor("fx-resource-frontend-hosting", "a"));
        registry.register(contributor("fx-resource-simple-auth", "b"));
        registry.register(contributor("fx-resource-bot", "c"));

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.ids(),
            vec!["fx-resource-frontend-hosting", "fx-resource-simple-auth", "fx-resource-bot"]
        );
    }

    #[tokio::test]
    async fn test_registry_replace_keeps_position() {
        let mut registry = ContributorRegistry::new();
        registry.register(contributor("first", "old"));
        registry.register(contributor("second", "b"));
        registry.register(contributor("first", "new"));

        assert_eq!(registry.ids(), vec!["first", "second"]);

        let ctx = ContributionContext::new(".", "app");
        let contribution = registry
            .get_required("first")
            .unwrap()
            .contribute(&ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contribution.parameters["marker"], "new");
    }

    #[test]
    fn test_registry_unregister() {
        let mut registry = ContributorRegistry::new();
        registry.register(contributor("test", "x"));

        assert!(registry.contains("test"));
        assert!(registry.unregister("test").is_some());
        assert!(!registry.contains("test"));
        assert!(registry.get_required("test").is_err());
    }
}
