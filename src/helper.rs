//! Binds a resource resolver to a populated repository.

use std::sync::Arc;

use crate::errors::{RepositoryError, ResolverError};
use crate::repository::{Repository, Session};
use crate::resolver::{ResourceResolver, VanityResourceResolver};

/// Supplies the resolver a benchmark measures.
pub trait TestHelper {
    /// Prepares a resolver for the content below `root_path`.
    fn init(
        &mut self,
        root_path: &str,
        session: &Session,
        repository: &Arc<Repository>,
    ) -> Result<(), ResolverError>;

    /// The resolver prepared by [`TestHelper::init`].
    fn resource_resolver(&self) -> Result<Arc<dyn ResourceResolver>, ResolverError>;

    /// Closes the resolver and forgets it. Safe to call more than once.
    fn dispose(&mut self) -> Result<(), ResolverError>;
}

/// Helper handing out a [`VanityResourceResolver`].
#[derive(Default)]
pub struct VanityTestHelper {
    root_path: Option<String>,
    resolver: Option<Arc<VanityResourceResolver>>,
}

impl VanityTestHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_path(&self) -> Option<&str> {
        self.root_path.as_deref()
    }

    /// The concrete resolver, for inspecting its index.
    pub fn vanity_resolver(&self) -> Option<&Arc<VanityResourceResolver>> {
        self.resolver.as_ref()
    }
}

impl TestHelper for VanityTestHelper {
    fn init(
        &mut self,
        root_path: &str,
        session: &Session,
        repository: &Arc<Repository>,
    ) -> Result<(), ResolverError> {
        if !session.is_live() {
            return Err(RepositoryError::SessionClosed.into());
        }
        if let Some(previous) = self.resolver.take() {
            previous.close();
        }
        let resolver = VanityResourceResolver::new(repository)?;
        tracing::debug!(
            "Helper bound to {}: {} vanity paths indexed",
            root_path,
            resolver.vanity_count()
        );
        self.root_path = Some(root_path.to_string());
        self.resolver = Some(Arc::new(resolver));
        Ok(())
    }

    fn resource_resolver(&self) -> Result<Arc<dyn ResourceResolver>, ResolverError> {
        self.resolver
            .as_ref()
            .map(|resolver| Arc::clone(resolver) as Arc<dyn ResourceResolver>)
            .ok_or(ResolverError::NotInitialized)
    }

    fn dispose(&mut self) -> Result<(), ResolverError> {
        if let Some(resolver) = self.resolver.take() {
            resolver.close();
        }
        self.root_path = None;
        Ok(())
    }
}
