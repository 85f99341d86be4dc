use thiserror::Error;
use xtdriver_traits::ResourceError;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("XML parse error in {path}: {source}")]
    Xml {
        path: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("{path}: <{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        path: String,
        element: String,
        attribute: String,
    },

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
}

impl CatalogError {
    pub fn xml(path: impl Into<String>, source: roxmltree::Error) -> Self {
        Self::Xml {
            path: path.into(),
            source,
        }
    }

    pub fn missing_attribute(
        path: impl Into<String>,
        element: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::MissingAttribute {
            path: path.into(),
            element: element.into(),
            attribute: attribute.into(),
        }
    }

    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }
}
