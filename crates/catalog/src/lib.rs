//! Test catalog model for W3C-style XSLT conformance suites.
//!
//! A suite is a `catalog.xml` naming test-set files; each test set holds test
//! cases with dependencies, an environment, the unit under test and a tree of
//! expected-result assertions. Everything is read through a
//! [`ResourceProvider`](xtdriver_traits::ResourceProvider) with `roxmltree`
//! and copied into owned structs, so the documents are not kept alive.

pub mod assertion;
pub mod error;
pub mod exceptions;
pub mod loader;
pub mod model;
mod parse;
pub mod uri;

pub use assertion::{Assertion, XPathCheck};
pub use error::CatalogError;
pub use exceptions::{ExceptionEntry, Exceptions};
pub use loader::{CATALOG_FILE, CatalogLoader, load_exceptions};
pub use model::{
    Catalog, CollationDecl, CollectionDecl, Dependency, EnvironmentDecl, EnvironmentRef,
    InitialFunction, InitialMode, InitialTemplate, OutputDecl, PackageRef, ParamDecl,
    ResourceDecl, SchemaDecl, SourceDecl, TestCase, TestInput, TestSet, TestSetRef,
};
pub use parse::is_xslt_name;
pub use uri::{file_path, file_uri, resolve_uri};

/// Namespace of the XSLT 3.0 test catalog.
pub const CATALOG_NAMESPACE: &str = "http://www.w3.org/2012/10/xslt-test-catalog";
