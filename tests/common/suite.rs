//! Small test suites written to a temporary directory, and a reader for the
//! results document a run leaves behind.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use xtdriver::results::{RESULTS_NAMESPACE, ResultsDocument};
use xtdriver::{DriverError, RunOptions, RunSummary, TestDriver};
use xtdriver_traits::Engine;
use xtdriver_traits::testing::ScriptedEngine;

pub const CATALOG_NAMESPACE: &str = "http://www.w3.org/2012/10/xslt-test-catalog";

pub struct Suite {
    root: TempDir,
    results: TempDir,
    sets: Vec<String>,
    environments: Vec<String>,
    dependencies: Vec<String>,
}

impl Suite {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("suite dir"),
            results: tempfile::tempdir().expect("results dir"),
            sets: Vec::new(),
            environments: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Writes a file relative to the suite root.
    pub fn file(&mut self, path: &str, text: &str) -> &mut Self {
        write(&self.root.path().join(path), text);
        self
    }

    /// Writes a file relative to the results directory.
    pub fn results_file(&mut self, path: &str, text: &str) -> &mut Self {
        write(&self.results.path().join(path), text);
        self
    }

    /// Adds a catalog-level `<environment>`.
    pub fn environment(&mut self, xml: &str) -> &mut Self {
        self.environments.push(xml.to_string());
        self
    }

    /// Adds a catalog-level dependency element.
    pub fn dependency(&mut self, xml: &str) -> &mut Self {
        self.dependencies.push(xml.to_string());
        self
    }

    /// Adds a test set whose document element wraps `body`.
    pub fn test_set(&mut self, name: &str, body: &str) -> &mut Self {
        let text = format!(
            r#"<test-set name="{name}" xmlns="{ns}">{body}</test-set>"#,
            name = name,
            ns = CATALOG_NAMESPACE,
            body = body
        );
        let path = format!("tests/{name}/_{name}-test-set.xml", name = name);
        self.file(&path, &text);
        self.sets.push(name.to_string());
        self
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn results_dir(&self) -> &Path {
        self.results.path()
    }

    /// Writes `catalog.xml` and returns options pointing at this suite.
    pub fn options(&self) -> RunOptions {
        let mut catalog = format!(r#"<catalog xmlns="{}">"#, CATALOG_NAMESPACE);
        for xml in self.dependencies.iter().chain(&self.environments) {
            catalog.push_str(xml);
        }
        for name in &self.sets {
            catalog.push_str(&format!(
                r#"<test-set name="{name}" file="tests/{name}/_{name}-test-set.xml"/>"#,
                name = name
            ));
        }
        catalog.push_str("</catalog>");
        write(&self.root.path().join("catalog.xml"), &catalog);
        RunOptions::new(self.root.path(), self.results.path())
    }

    pub fn run(&self, engine: &ScriptedEngine) -> Result<RunReport, DriverError> {
        self.run_with(engine, self.options())
    }

    pub fn run_with(
        &self,
        engine: &ScriptedEngine,
        options: RunOptions,
    ) -> Result<RunReport, DriverError> {
        let summary = TestDriver::new(engine, options)?.run()?;
        let path = ResultsDocument::path_for(self.results.path(), engine.product_version());
        let xml = fs::read_to_string(path)?;
        Ok(RunReport::parse(summary, xml))
    }
}

fn write(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture directory");
    }
    fs::write(path, text).expect("write fixture");
}

/// One `test-case` record of the results document.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub set: String,
    pub name: String,
    pub result: String,
    pub comment: Option<String>,
}

#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub cases: Vec<Recorded>,
    pub xml: String,
}

impl RunReport {
    fn parse(summary: RunSummary, xml: String) -> Self {
        let cases = {
            let doc = roxmltree::Document::parse(&xml).expect("results document is well-formed");
            doc.descendants()
                .filter(|n| n.has_tag_name((RESULTS_NAMESPACE, "test-case")))
                .map(|case| Recorded {
                    set: case
                        .parent_element()
                        .and_then(|s| s.attribute("name"))
                        .unwrap_or_default()
                        .to_string(),
                    name: case.attribute("name").unwrap_or_default().to_string(),
                    result: case.attribute("result").unwrap_or_default().to_string(),
                    comment: case.attribute("comment").map(str::to_string),
                })
                .collect()
        };
        Self {
            summary,
            cases,
            xml,
        }
    }

    pub fn case(&self, name: &str) -> &Recorded {
        self.cases
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no record for {} in\n{}", name, self.xml))
    }

    pub fn verdict(&self, name: &str) -> &str {
        &self.case(name).result
    }

    pub fn comment(&self, name: &str) -> &str {
        self.case(name).comment.as_deref().unwrap_or("")
    }

    /// Test-set sections in document order.
    pub fn sets(&self) -> Vec<String> {
        let doc = roxmltree::Document::parse(&self.xml).expect("results document is well-formed");
        doc.descendants()
            .filter(|n| n.has_tag_name((RESULTS_NAMESPACE, "test-set")))
            .filter_map(|n| n.attribute("name").map(str::to_string))
            .collect()
    }
}
