#![allow(dead_code)]

pub mod suite;

pub use suite::{Recorded, RunReport, Suite};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Routes driver logging to the test harness when `RUST_LOG` is set.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
