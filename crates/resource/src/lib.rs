//! Resource providers for reading a conformance test suite.
//!
//! - [`FilesystemResourceProvider`]: reads files below a suite (or results) directory
//! - [`InMemoryResourceProvider`]: re-exported from xtdriver-traits for tests

mod filesystem;

pub use filesystem::FilesystemResourceProvider;

pub use xtdriver_traits::InMemoryResourceProvider;
