// src/error.rs
use thiserror::Error;
use xtdriver_catalog::CatalogError;
use xtdriver_traits::ResourceError;

/// Errors that stop a run. Failures of the unit under test never surface here;
/// they are recorded in the test outcome instead.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Results document error: {0}")]
    Results(#[from] quick_xml::Error),

    #[error("Summary serialization error: {0}")]
    Summary(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A catalog asserted a dependency type the driver no longer accepts.
    #[error("Dependency type '{kind}' is retired and must not appear in the catalog")]
    RetiredDependency { kind: String },

    #[error("Test set '{0}' is not in the catalog")]
    UnknownTestSet(String),

    #[error("Invalid test name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl DriverError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors that mean the catalog and driver disagree on the vocabulary.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, DriverError::RetiredDependency { .. })
    }
}

impl From<config::ConfigError> for DriverError {
    fn from(e: config::ConfigError) -> Self {
        DriverError::Config(e.to_string())
    }
}
