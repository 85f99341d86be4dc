mod common;

use common::{Suite, TestResult, init_logging};
use xtdriver::executor::base_output_uri;
use xtdriver_traits::Edition;
use xtdriver_traits::testing::{Script, ScriptedEngine};

fn serialization_case(name: &str, stylesheet: &str, expected: &str) -> String {
    format!(
        r#"<test-case name="{name}">
             <test><stylesheet file="{stylesheet}"/></test>
             <result><assert-serialization><![CDATA[{expected}]]></assert-serialization></result>
           </test-case>"#
    )
}

#[test]
fn test_exact_serialization_passes() -> TestResult {
    init_logging();
    let mut suite = Suite::new();
    suite.test_set("s1", &serialization_case("c1", "emit-a.xsl", "<a/>"));
    let engine = ScriptedEngine::new(Edition::He);
    engine.script("emit-a.xsl", Script::output("<a/>"));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("c1"), "pass");
    assert_eq!(report.summary.successes, 1);
    assert_eq!(report.summary.total(), 1);
    Ok(())
}

#[test]
fn test_serialization_mismatch_fails_with_comment() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set("s1", &serialization_case("c1", "emit-b.xsl", "<a/>"));
    let engine = ScriptedEngine::new(Edition::He);
    engine.script("emit-b.xsl", Script::output("<b/>"));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("c1"), "fail");
    assert_eq!(report.summary.failures, 1);
    assert!(report.comment("c1").contains("serialization mismatch"));
    Ok(())
}

#[test]
fn test_inverted_feature_dependency_is_not_run() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="c2">
             <dependency type="feature" value="streaming" satisfied="false"/>
             <test><stylesheet file="stream.xsl"/></test>
             <result><assert-xml><![CDATA[<a/>]]></assert-xml></result>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::Ee);
    engine.script("stream.xsl", Script::output("<a/>"));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("c2"), "notRun");
    assert_eq!(report.comment("c2"), "dependency not satisfied: !feature:streaming");
    assert_eq!(report.summary.not_run, 1);
    assert_eq!(engine.compile_count(), 0);
    Ok(())
}

#[test]
fn test_missing_optional_feature_names_it() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="needs-schema">
             <dependencies><feature value="schema_aware"/></dependencies>
             <test><stylesheet file="sa.xsl"/></test>
             <result><assert-xml><![CDATA[<a/>]]></assert-xml></result>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::He);

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("needs-schema"), "notRun");
    assert_eq!(report.comment("needs-schema"), "requires optional feature:schema_aware");
    Ok(())
}

#[test]
fn test_expected_static_error_passes() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="c3">
             <test><stylesheet file="malformed.xsl"/></test>
             <result><error code="XTSE0010"/></result>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::He);
    engine.script("malformed.xsl", Script::StaticError("XTSE0010".to_string()));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("c3"), "pass");
    assert_eq!(report.summary.successes, 1);
    assert_eq!(engine.run_count(), 0);
    Ok(())
}

#[test]
fn test_wrong_error_code_is_counted_apart() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="c3">
             <test><stylesheet file="malformed.xsl"/></test>
             <result><error code="XTSE0010"/></result>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::He);
    engine.script("malformed.xsl", Script::StaticError("XTSE0020".to_string()));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("c3"), "pass");
    assert!(report.comment("c3").contains("Expected XTSE0010, got XTSE0020"));
    assert_eq!(report.summary.successes, 0);
    assert_eq!(report.summary.wrong_error_results, 1);
    Ok(())
}

#[test]
fn test_any_of_alternative_error_code_is_a_clean_pass() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="loop">
             <test><stylesheet file="loop.xsl"/></test>
             <result>
               <any-of><error code="XTDE0640"/><error code="XTRE0640"/></any-of>
             </result>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::He);
    engine.script("loop.xsl", Script::StaticError("XTRE0640".to_string()));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("loop"), "pass");
    assert_eq!(report.comment("loop"), "");
    assert_eq!(report.summary.successes, 1);
    assert_eq!(report.summary.wrong_error_results, 0);
    Ok(())
}

#[test]
fn test_result_documents_split_between_principal_and_secondary() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="c4">
             <test><stylesheet file="multi.xsl"/></test>
             <result>
               <all-of>
                 <assert-xml><![CDATA[<main/>]]></assert-xml>
                 <assert-result-document uri="extra.xml">
                   <assert-xml><![CDATA[<extra/>]]></assert-xml>
                 </assert-result-document>
               </all-of>
             </result>
           </test-case>"#,
    );
    let base = base_output_uri(suite.results_dir());
    let extra = base.replace("output.xml", "extra.xml");
    let engine = ScriptedEngine::new(Edition::He);
    engine.script(
        "multi.xsl",
        Script::Documents(vec![
            (None, "<main/>".to_string()),
            (Some(extra), "<extra/>".to_string()),
        ]),
    );

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("c4"), "pass", "{}", report.comment("c4"));
    assert_eq!(
        engine.runs()[0].base_output_uri.as_deref(),
        Some(base.as_str())
    );
    Ok(())
}

#[test]
fn test_missing_result_document_fails() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="c5">
             <test><stylesheet file="single.xsl"/></test>
             <result>
               <assert-result-document uri="absent.xml">
                 <assert-xml><![CDATA[<extra/>]]></assert-xml>
               </assert-result-document>
             </result>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::He);
    engine.script("single.xsl", Script::output("<main/>"));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("c5"), "fail");
    assert!(report.comment("c5").contains("absent.xml"));
    Ok(())
}

#[test]
fn test_empty_result_always_fails() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="empty">
             <test><stylesheet file="fine.xsl"/></test>
             <result/>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::He);
    engine.script("fine.xsl", Script::output("<ok/>"));

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("empty"), "fail");
    assert_eq!(report.comment("empty"), "no test assertions found");
    assert_eq!(engine.run_count(), 1);
    Ok(())
}

#[test]
fn test_messages_feed_assert_message() -> TestResult {
    let mut suite = Suite::new();
    suite.test_set(
        "s1",
        r#"<test-case name="msg">
             <test><stylesheet file="talk.xsl"/></test>
             <result>
               <assert-message><assert-xml><![CDATA[<hello/>]]></assert-xml></assert-message>
             </result>
           </test-case>"#,
    );
    let engine = ScriptedEngine::new(Edition::He);
    engine.script(
        "talk.xsl",
        Script::with_messages("<out/>", vec!["<noise/>".to_string(), "<hello/>".to_string()]),
    );

    let report = suite.run(&engine)?;
    assert_eq!(report.verdict("msg"), "pass", "{}", report.comment("msg"));
    Ok(())
}
