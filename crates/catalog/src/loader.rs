use crate::error::CatalogError;
use crate::exceptions::Exceptions;
use crate::model::{Catalog, TestSet, TestSetRef};
use crate::parse::{Context, parse_catalog, parse_document, parse_test_set};
use log::debug;
use std::sync::Arc;
use xtdriver_traits::{Edition, ResourceProvider};

/// Name of the catalog document at the suite root.
pub const CATALOG_FILE: &str = "catalog.xml";

/// Reads catalog and test-set documents through a [`ResourceProvider`].
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    provider: Arc<dyn ResourceProvider>,
}

impl CatalogLoader {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn ResourceProvider {
        self.provider.as_ref()
    }

    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        let text = self.provider.load_string(CATALOG_FILE)?;
        let doc = parse_document(CATALOG_FILE, &text)?;
        let ctx = Context::new(CATALOG_FILE, self.provider.as_ref(), &text);
        let catalog = parse_catalog(&doc, &ctx)?;
        debug!(
            "Catalog has {} test sets and {} global environments",
            catalog.test_sets.len(),
            catalog.environments.len()
        );
        Ok(catalog)
    }

    pub fn load_test_set(&self, set: &TestSetRef) -> Result<TestSet, CatalogError> {
        let text = self.provider.load_string(&set.file)?;
        let doc = parse_document(&set.file, &text)?;
        let ctx = Context::new(&set.file, self.provider.as_ref(), &text);
        parse_test_set(&doc, &ctx)
    }
}

/// Loads an exceptions file from `provider`.
pub fn load_exceptions(
    provider: &dyn ResourceProvider,
    path: &str,
    edition: Edition,
    unfolded: bool,
) -> Result<Exceptions, CatalogError> {
    let text = provider.load_string(path)?;
    Exceptions::parse(path, &text, edition, unfolded)
}
