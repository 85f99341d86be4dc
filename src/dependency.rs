//! Dependency resolution: decides whether a test's declared preconditions hold
//! for the processor under test, toggling engine settings where a dependency
//! can be met by configuration.
//!
//! Every toggle goes through [`Environment::change`], which records the undo
//! action on the environment. The caller decides when the undo runs (end of
//! test case, or end of test set for set-level dependencies).

use crate::config::Spec;
use crate::environment::Environment;
use crate::error::DriverError;
use log::warn;
use std::collections::HashSet;
use xtdriver_catalog::Dependency;
use xtdriver_traits::{Edition, XmlVersion};

const ALWAYS_ON: &[&str] = &[
    "feature/disabling_output_escaping",
    "feature/serialization",
    "feature/namespace_axis",
    "feature/dtd",
    "feature/built_in_derived_types",
    "feature/remote_http",
    "feature/xsl-stylesheet-processing-instruction",
    "feature/fn-transform-XSLT",
    "available_documents",
    "ordinal_scheme_name",
    "default_calendar_in_date_formatting_functions",
    "supported_calendars_in_date_formatting_functions",
    "maximum_number_of_decimal_digits",
    "default_output_encoding",
    "unparsed_text_encoding",
    "recognize_id_as_uri_fragment",
    "feature/XPath_3.1",
    "feature/backwards_compatibility",
    "feature/HTML4",
    "feature/HTML5",
    "detect_accumulator_cycles",
];

const NEEDS_PE: &[&str] = &["feature/Saxon-PE", "feature/dynamic_evaluation"];

const NEEDS_EE: &[&str] = &[
    "languages_for_numbering",
    "feature/streaming",
    "feature/schema_aware",
    "feature/Saxon-EE",
    "feature/xquery_invocation",
    "feature/higher_order_functions",
];

const UNSUPPORTED_NUMBERING: &[&str] = &[
    "COPTIC EPACT DIGIT ONE",
    "SINHALA ARCHAIC DIGIT ONE",
    "MENDE KIKAKUI DIGIT ONE",
];

/// Dependency types with dedicated handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyKind {
    Spec,
    Feature,
    DefaultLanguageForNumbering,
    EnableAssertions,
    ExtensionFunction,
    YearComponentValues,
    AdditionalNormalizationForm,
    OnMultipleMatch,
    IgnoreDocFailure,
    CombinationsForNumbering,
    XsdVersion,
    SweepAndPosture,
    UnicodeVersion,
    DefaultHtmlVersion,
    Unknown,
}

const KINDS: &[(&str, DependencyKind)] = &[
    ("spec", DependencyKind::Spec),
    ("feature", DependencyKind::Feature),
    (
        "default_language_for_numbering",
        DependencyKind::DefaultLanguageForNumbering,
    ),
    ("enable_assertions", DependencyKind::EnableAssertions),
    ("extension-function", DependencyKind::ExtensionFunction),
    ("year_component_values", DependencyKind::YearComponentValues),
    (
        "additional_normalization_form",
        DependencyKind::AdditionalNormalizationForm,
    ),
    ("on-multiple-match", DependencyKind::OnMultipleMatch),
    ("ignore_doc_failure", DependencyKind::IgnoreDocFailure),
    (
        "combinations_for_numbering",
        DependencyKind::CombinationsForNumbering,
    ),
    ("xsd-version", DependencyKind::XsdVersion),
    ("sweep_and_posture", DependencyKind::SweepAndPosture),
    ("unicode-version", DependencyKind::UnicodeVersion),
    ("default_html_version", DependencyKind::DefaultHtmlVersion),
];

impl DependencyKind {
    fn of(kind: &str) -> Self {
        KINDS
            .iter()
            .find(|(name, _)| *name == kind)
            .map(|(_, k)| *k)
            .unwrap_or(DependencyKind::Unknown)
    }
}

/// Features within `feature` dependencies that need more than a capability lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    Xml11,
    Xsd11,
    HigherOrderFunctions,
    SimpleUcaFallback,
    AdvancedUcaFallback,
    StreamingFallback,
    EnableAssertions,
    Other,
}

impl Feature {
    fn of(value: &str) -> Self {
        match value {
            "XML_1.1" => Feature::Xml11,
            "XSD_1.1" => Feature::Xsd11,
            "higher_order_functions" => Feature::HigherOrderFunctions,
            "simple-uca-fallback" => Feature::SimpleUcaFallback,
            "advanced-uca-fallback" => Feature::AdvancedUcaFallback,
            "streaming-fallback" => Feature::StreamingFallback,
            "enable_assertions" => Feature::EnableAssertions,
            _ => Feature::Other,
        }
    }
}

/// Resolves dependency assertions against a processor's edition and the run's spec level.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    edition: Edition,
    spec: Spec,
    always_on: HashSet<&'static str>,
    always_off: HashSet<String>,
    needs_pe: HashSet<&'static str>,
    needs_ee: HashSet<&'static str>,
}

impl DependencyResolver {
    pub fn new(edition: Edition, spec: Spec) -> Self {
        Self {
            edition,
            spec,
            always_on: ALWAYS_ON.iter().copied().collect(),
            always_off: HashSet::new(),
            needs_pe: NEEDS_PE.iter().copied().collect(),
            needs_ee: NEEDS_EE.iter().copied().collect(),
        }
    }

    /// Declares `type` or `type/value` keys as never supported.
    pub fn with_always_off<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.always_off.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn edition(&self) -> Edition {
        self.edition
    }

    pub fn spec(&self) -> Spec {
        self.spec
    }

    /// Returns whether `dependency` holds, possibly changing `env`'s engine
    /// configuration (with an undo action recorded on `env`).
    ///
    /// `Err` is reserved for dependency types the catalog must not use.
    pub fn satisfied(
        &self,
        dependency: &Dependency,
        env: &mut Environment,
    ) -> Result<bool, DriverError> {
        let kind = dependency.kind.as_str();
        let value = dependency.value_or_any();
        let inverse = dependency.is_inverse();
        let needed = !inverse;
        let keyed = format!("{}/{}", kind, value);

        if self.always_on.contains(kind) || self.always_on.contains(keyed.as_str()) {
            return Ok(needed);
        }
        if self.always_off.contains(kind) || self.always_off.contains(&keyed) {
            return Ok(!needed);
        }
        if self.needs_pe.contains(kind) || self.needs_pe.contains(keyed.as_str()) {
            return Ok(self.edition.is_professional() == needed);
        }
        if self.needs_ee.contains(kind) || self.needs_ee.contains(keyed.as_str()) {
            return Ok((self.edition == Edition::Ee) == needed);
        }

        let baseline = self.edition.is_baseline();
        let result = match DependencyKind::of(kind) {
            DependencyKind::Spec => self.spec_satisfied(value),
            DependencyKind::Feature => self.feature_satisfied(value, inverse, env),
            DependencyKind::DefaultLanguageForNumbering => {
                if env.config.default_language.as_deref() != Some(value) {
                    env.change(|c| &mut c.default_language, Some(value.to_string()));
                }
                true
            }
            DependencyKind::EnableAssertions => {
                env.change(|c| &mut c.assertions_enabled, !inverse);
                true
            }
            DependencyKind::ExtensionFunction => false,
            DependencyKind::YearComponentValues => {
                if value == "support year zero" {
                    let version = if inverse { "1.0" } else { "1.1" };
                    env.change(|c| &mut c.xsd_version, version.to_string());
                    true
                } else {
                    !inverse
                }
            }
            DependencyKind::AdditionalNormalizationForm => {
                if value == "support FULLY-NORMALIZED" {
                    inverse
                } else {
                    !inverse
                }
            }
            DependencyKind::OnMultipleMatch => {
                return Err(DriverError::RetiredDependency {
                    kind: kind.to_string(),
                });
            }
            DependencyKind::IgnoreDocFailure => inverse,
            DependencyKind::CombinationsForNumbering => {
                if UNSUPPORTED_NUMBERING.contains(&value) {
                    false
                } else {
                    !inverse
                }
            }
            DependencyKind::XsdVersion => !baseline,
            DependencyKind::SweepAndPosture => {
                if baseline {
                    inverse
                } else {
                    true
                }
            }
            DependencyKind::UnicodeVersion => value == "6.0",
            DependencyKind::DefaultHtmlVersion => value == "5",
            DependencyKind::Unknown => {
                warn!("dependency not recognized: {}", dependency.describe());
                false
            }
        };
        Ok(result)
    }

    /// `XSLT30+` accepts this level or later; `XSLT20` requires it exactly.
    /// Space-separated alternatives are accepted if any one matches.
    /// The whole value is compared lexically with the current spec name.
    fn spec_satisfied(&self, value: &str) -> bool {
        let current = self.spec.version_name();
        let at_least = value.ends_with('+');
        let required = value.trim_end_matches('+').replace("XT", "XSLT");
        if at_least {
            required.as_str() <= current.as_str()
        } else {
            required == current
        }
    }

    fn feature_satisfied(&self, value: &str, inverse: bool, env: &mut Environment) -> bool {
        match Feature::of(value) {
            Feature::Xml11 => {
                let version = if inverse {
                    XmlVersion::V10
                } else {
                    XmlVersion::V11
                };
                env.change(|c| &mut c.xml_version, version);
                true
            }
            Feature::Xsd11 => {
                let version = if inverse { "1.0" } else { "1.1" };
                if env.config.xsd_version != version {
                    env.change(|c| &mut c.xsd_version, version.to_string());
                }
                true
            }
            Feature::HigherOrderFunctions | Feature::SimpleUcaFallback => !inverse,
            Feature::AdvancedUcaFallback => self.edition.is_professional() != inverse,
            Feature::StreamingFallback => {
                let required = !inverse;
                if env.config.streaming_fallback != required {
                    env.change(|c| &mut c.streaming_fallback, required);
                }
                true
            }
            Feature::EnableAssertions => {
                env.change(|c| &mut c.assertions_enabled, !inverse);
                true
            }
            Feature::Other => {
                warn!("*** Unknown feature in {}: {}", self.edition, value);
                !self.edition.is_baseline()
            }
        }
    }
}

/// The not-run comment for an unsatisfied case-level dependency.
pub fn not_run_message(dependency: &Dependency) -> String {
    let reason = dependency.describe();
    if reason.starts_with("feature:") {
        format!("requires optional {}", reason)
    } else {
        format!("dependency not satisfied: {}", reason)
    }
}

/// The not-run comment given to every case of a test set whose own dependency failed.
pub fn test_set_message(dependency: &Dependency) -> String {
    format!(
        "test-set dependencies not satisfied: {}",
        dependency.describe()
    )
}
