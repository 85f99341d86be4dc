//! The results document and the run summary.
//!
//! ```xml
//! <test-suite-result xmlns="http://www.w3.org/2012/11/xslt30-test-results">
//!   <submission anonymous="false"><created by="xtdriver" on="2026-01-31"/></submission>
//!   <product vendor="Saxon" name="Saxon-HE" version="12.5" language="XSLT30"/>
//!   <test-set name="s1">
//!     <test-case name="c1" result="pass"/>
//!   </test-set>
//! </test-suite-result>
//! ```

use crate::error::DriverError;
use log::warn;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const RESULTS_NAMESPACE: &str = "http://www.w3.org/2012/11/xslt30-test-results";

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail,
    NotRun,
    NotApplicable,
}

impl Verdict {
    pub fn token(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::NotRun => "notRun",
            Verdict::NotApplicable => "n/a",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Running totals for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub successes: usize,
    pub failures: usize,
    pub wrong_error_results: usize,
    pub not_run: usize,
}

impl RunSummary {
    /// Counts one verdict. A pass with a wrong error code is counted apart from successes.
    pub fn count(&mut self, verdict: Verdict, wrong_error: bool) {
        match verdict {
            Verdict::Pass if wrong_error => self.wrong_error_results += 1,
            Verdict::Pass => self.successes += 1,
            Verdict::Fail => self.failures += 1,
            Verdict::NotRun | Verdict::NotApplicable => self.not_run += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.successes + self.failures + self.wrong_error_results + self.not_run
    }

    pub fn write_json(&self, path: &Path) -> Result<(), DriverError> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} successes, {} failures, {} incorrect ErrorCode, {} not run",
            self.successes, self.failures, self.wrong_error_results, self.not_run
        )
    }
}

/// Identifies the processor in the results preamble.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub vendor: String,
    pub name: String,
    pub version: String,
    /// Language token, e.g. `XSLT30`.
    pub language: String,
}

/// Streams the results document. Preamble and postamble are written at most
/// once; the postamble closes an open test-set section.
pub struct ResultsDocument<W: Write> {
    writer: Writer<W>,
    started: bool,
    finished: bool,
    section_open: bool,
}

impl ResultsDocument<BufWriter<File>> {
    /// Creates `results<version>.xml` in `results_dir`.
    pub fn create(results_dir: &Path, product_version: &str) -> Result<Self, DriverError> {
        let path = Self::path_for(results_dir, product_version);
        let file = File::create(&path)?;
        log::info!("Writing results to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }

    pub fn path_for(results_dir: &Path, product_version: &str) -> PathBuf {
        results_dir.join(format!("results{}.xml", product_version))
    }
}

impl<W: Write> ResultsDocument<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
            started: false,
            finished: false,
            section_open: false,
        }
    }

    pub fn write_preamble(&mut self, product: &ProductInfo) -> Result<(), DriverError> {
        if self.started {
            warn!("Results preamble already written");
            return Ok(());
        }
        self.started = true;
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.writer.write_event(Event::Start(
            BytesStart::new("test-suite-result").with_attributes([("xmlns", RESULTS_NAMESPACE)]),
        ))?;

        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        self.writer.write_event(Event::Start(
            BytesStart::new("submission").with_attributes([("anonymous", "false")]),
        ))?;
        self.writer.write_event(Event::Empty(
            BytesStart::new("created")
                .with_attributes([("by", env!("CARGO_PKG_NAME")), ("on", today.as_str())]),
        ))?;
        self.writer
            .write_event(Event::End(BytesEnd::new("submission")))?;

        self.writer.write_event(Event::Empty(BytesStart::new("product").with_attributes([
            ("vendor", product.vendor.as_str()),
            ("name", product.name.as_str()),
            ("version", product.version.as_str()),
            ("language", product.language.as_str()),
        ])))?;
        Ok(())
    }

    pub fn start_test_set(&mut self, name: &str) -> Result<(), DriverError> {
        self.end_test_set()?;
        self.writer.write_event(Event::Start(
            BytesStart::new("test-set").with_attributes([("name", name)]),
        ))?;
        self.section_open = true;
        Ok(())
    }

    pub fn end_test_set(&mut self) -> Result<(), DriverError> {
        if self.section_open {
            self.writer.write_event(Event::End(BytesEnd::new("test-set")))?;
            self.section_open = false;
        }
        Ok(())
    }

    pub fn write_test_case(
        &mut self,
        name: &str,
        verdict: Verdict,
        comment: Option<&str>,
    ) -> Result<(), DriverError> {
        let mut element = BytesStart::new("test-case")
            .with_attributes([("name", name), ("result", verdict.token())]);
        if let Some(comment) = comment.filter(|c| !c.is_empty()) {
            element.push_attribute(("comment", comment));
        }
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    pub fn write_postamble(&mut self) -> Result<(), DriverError> {
        if self.finished {
            warn!("Results postamble already written");
            return Ok(());
        }
        self.finished = true;
        self.end_test_set()?;
        self.writer
            .write_event(Event::End(BytesEnd::new("test-suite-result")))?;
        self.writer.get_mut().flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ProductInfo {
        ProductInfo {
            vendor: "Saxonica".to_string(),
            name: "Saxon-HE".to_string(),
            version: "12.5".to_string(),
            language: "XSLT30".to_string(),
        }
    }

    fn render(build: impl FnOnce(&mut ResultsDocument<Vec<u8>>)) -> String {
        let mut doc = ResultsDocument::new(Vec::new());
        build(&mut doc);
        String::from_utf8(doc.into_inner()).unwrap()
    }

    #[test]
    fn test_document_shape() {
        let xml = render(|doc| {
            doc.write_preamble(&product()).unwrap();
            doc.start_test_set("s1").unwrap();
            doc.write_test_case("c1", Verdict::Pass, None).unwrap();
            doc.write_test_case("c2", Verdict::NotApplicable, Some("env & deps"))
                .unwrap();
            doc.start_test_set("s2").unwrap();
            doc.write_postamble().unwrap();
        });

        let parsed = roxmltree::Document::parse(&xml).unwrap();
        let root = parsed.root_element();
        assert_eq!(root.tag_name().name(), "test-suite-result");
        assert_eq!(root.tag_name().namespace(), Some(RESULTS_NAMESPACE));

        let sets: Vec<_> = root
            .children()
            .filter(|n| n.has_tag_name((RESULTS_NAMESPACE, "test-set")))
            .collect();
        assert_eq!(sets.len(), 2);
        let cases: Vec<_> = sets[0].children().filter(|n| n.is_element()).collect();
        assert_eq!(cases[0].attribute("result"), Some("pass"));
        assert_eq!(cases[0].attribute("comment"), None);
        assert_eq!(cases[1].attribute("result"), Some("n/a"));
        assert_eq!(cases[1].attribute("comment"), Some("env & deps"));
    }

    #[test]
    fn test_preamble_and_postamble_written_once() {
        let xml = render(|doc| {
            doc.write_preamble(&product()).unwrap();
            doc.write_preamble(&product()).unwrap();
            doc.write_postamble().unwrap();
            doc.write_postamble().unwrap();
        });
        assert_eq!(xml.matches("<test-suite-result").count(), 1);
        assert_eq!(xml.matches("</test-suite-result>").count(), 1);
        assert!(roxmltree::Document::parse(&xml).is_ok());
    }

    #[test]
    fn test_summary_counting() {
        let mut summary = RunSummary::default();
        summary.count(Verdict::Pass, false);
        summary.count(Verdict::Pass, true);
        summary.count(Verdict::Fail, false);
        summary.count(Verdict::NotRun, false);
        summary.count(Verdict::NotApplicable, false);
        assert_eq!(
            summary,
            RunSummary {
                successes: 1,
                failures: 1,
                wrong_error_results: 1,
                not_run: 2,
            }
        );
        assert_eq!(summary.total(), 5);
        assert_eq!(
            summary.to_string(),
            "1 successes, 1 failures, 1 incorrect ErrorCode, 2 not run"
        );
    }

    #[test]
    fn test_summary_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SUMMARY_FILE);
        let summary = RunSummary {
            successes: 3,
            ..RunSummary::default()
        };
        summary.write_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["successes"], 3);
        assert_eq!(value["not_run"], 0);
    }
}
