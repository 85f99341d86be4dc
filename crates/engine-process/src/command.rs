//! Command-line arguments in the `-name:value` convention of Saxon-style processors.

use xtdriver_traits::{
    ByteCodeLevel, CompileRequest, EngineConfig, EntryPoint, Param, QName, UnitKind, XmlVersion,
    XSLT_NAMESPACE,
};

/// Clark notation, `{uri}local`, which the command line accepts for qualified names.
pub fn clark(name: &QName) -> String {
    match &name.namespace {
        Some(ns) => format!("{{{}}}{}", ns, name.local),
        None => name.local.clone(),
    }
}

/// The command line has no tunnel parameters, so tunnelled ones arrive as plain ones.
pub fn loses_tunnelling(params: &[Param], tunnel: bool) -> bool {
    tunnel && !params.is_empty()
}

/// `?name=expression` binds a parameter to the value of an XPath expression.
pub fn param_arg(param: &Param) -> String {
    format!("?{}={}", clark(&param.name), param.select)
}

/// Processor switches derived from the engine configuration.
pub fn config_args(config: &EngineConfig) -> Vec<String> {
    let mut args = vec![format!("-xsdversion:{}", config.xsd_version)];
    if config.xml_version == XmlVersion::V11 {
        args.push("-xmlversion:1.1".to_string());
    }
    if config.assertions_enabled {
        args.push("-ea:on".to_string());
    }
    if config.streaming_fallback {
        args.push("--streamingFallback:on".to_string());
    }
    if let Some(lang) = &config.default_language {
        args.push(format!("--defaultLanguage:{}", lang));
    }
    match config.byte_code {
        ByteCodeLevel::Off => args.push("--generateByteCode:off".to_string()),
        ByteCodeLevel::On => args.push("--generateByteCode:on".to_string()),
        ByteCodeLevel::Debug => {
            args.push("--generateByteCode:on".to_string());
            args.push("--debugByteCode:on".to_string());
        }
    }
    args
}

/// Arguments that identify and statically configure the unit under test.
/// Queries are rejected: they need a different entry class.
pub fn unit_args(request: &CompileRequest<'_>) -> Result<Vec<String>, String> {
    let mut args = match request.kind {
        UnitKind::Stylesheet | UnitKind::Package => vec![format!("-xsl:{}", request.location)],
        UnitKind::Query => {
            return Err("queries cannot be run through the XSLT command line".to_string());
        }
    };
    if !request.secondary_packages.is_empty() {
        args.push(format!("-pack:{}", request.secondary_packages.join(",")));
    }
    for schema in &request.schema_imports {
        args.push(format!("-xsd:{}", schema));
    }
    if let Some(collation) = &request.default_collation {
        args.push(format!("--defaultCollation:{}", collation));
    }
    args.extend(request.static_params.iter().map(param_arg));
    args.extend(config_args(request.config));
    Ok(args)
}

/// Arguments that select the initial invocation.
pub fn entry_args(entry: &EntryPoint) -> Result<Vec<String>, String> {
    match entry {
        EntryPoint::Template(name)
            if name.namespace.as_deref() == Some(XSLT_NAMESPACE)
                && name.local == "initial-template" =>
        {
            Ok(vec!["-it".to_string()])
        }
        EntryPoint::Template(name) => Ok(vec![format!("-it:{}", clark(name))]),
        EntryPoint::Function { name, .. } => Err(format!(
            "initial function {} cannot be invoked from the command line",
            name
        )),
        EntryPoint::ApplyTemplates { select: Some(select) } => Err(format!(
            "initial match selection '{}' cannot be set from the command line",
            select
        )),
        EntryPoint::ApplyTemplates { select: None } => Ok(Vec::new()),
    }
}

/// Escapes text for a double-quoted attribute value.
pub fn escape_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

/// A stylesheet printing `true` or `false` for the effective boolean value of
/// `expression`, with the source document bound to `$result` when there is one.
pub fn boolean_stylesheet(expression: &str, with_context: bool) -> String {
    let (matcher, result) = if with_context {
        ("match=\"/\"", ".")
    } else {
        ("name=\"xsl:initial-template\"", "()")
    };
    format!(
        r#"<xsl:stylesheet version="3.0" xmlns:xsl="{xsl}" xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:fn="http://www.w3.org/2005/xpath-functions" xmlns:map="http://www.w3.org/2005/xpath-functions/map" xmlns:array="http://www.w3.org/2005/xpath-functions/array">
  <xsl:output method="text"/>
  <xsl:template {matcher}>
    <xsl:variable name="result" select="{result}"/>
    <xsl:value-of select="boolean({expression})"/>
  </xsl:template>
</xsl:stylesheet>
"#,
        xsl = XSLT_NAMESPACE,
        matcher = matcher,
        result = result,
        expression = escape_attribute(expression),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clark_names() {
        assert_eq!(clark(&QName::local("p")), "p");
        assert_eq!(clark(&QName::new(Some("urn:x"), "p")), "{urn:x}p");
        assert_eq!(
            param_arg(&Param::new(QName::new(Some("urn:x"), "p"), "'a b'")),
            "?{urn:x}p='a b'"
        );
    }

    #[test]
    fn test_empty_tunnel_list_loses_nothing() {
        assert!(!loses_tunnelling(&[], true));
        let params = [Param::new(QName::local("t"), "1")];
        assert!(loses_tunnelling(&params, true));
        assert!(!loses_tunnelling(&params, false));
    }

    #[test]
    fn test_default_config_args() {
        assert_eq!(
            config_args(&EngineConfig::default()),
            vec!["-xsdversion:1.1", "--generateByteCode:off"]
        );
    }

    #[test]
    fn test_toggled_config_args() {
        let config = EngineConfig {
            xsd_version: "1.0".to_string(),
            xml_version: XmlVersion::V11,
            streaming_fallback: true,
            assertions_enabled: true,
            default_language: Some("de".to_string()),
            byte_code: ByteCodeLevel::Debug,
            unfolded: false,
        };
        let args = config_args(&config);
        assert_eq!(args[0], "-xsdversion:1.0");
        assert!(args.contains(&"-xmlversion:1.1".to_string()));
        assert!(args.contains(&"-ea:on".to_string()));
        assert!(args.contains(&"--streamingFallback:on".to_string()));
        assert!(args.contains(&"--defaultLanguage:de".to_string()));
        assert!(args.contains(&"--debugByteCode:on".to_string()));
    }

    #[test]
    fn test_unit_args_for_package_with_libraries() {
        let config = EngineConfig::default();
        let mut request = CompileRequest::new(UnitKind::Package, "/suite/main.xsl", &config);
        request.secondary_packages = vec!["/suite/a.xsl".to_string(), "/suite/b.xsl".to_string()];
        request.static_params = vec![Param::new(QName::local("debug"), "true()")];
        let args = unit_args(&request).unwrap();
        assert_eq!(args[0], "-xsl:/suite/main.xsl");
        assert_eq!(args[1], "-pack:/suite/a.xsl,/suite/b.xsl");
        assert_eq!(args[2], "?debug=true()");
    }

    #[test]
    fn test_queries_are_rejected() {
        let config = EngineConfig::default();
        let request = CompileRequest::new(UnitKind::Query, "/suite/q.xq", &config);
        assert!(unit_args(&request).is_err());
    }

    #[test]
    fn test_entry_args() {
        assert_eq!(
            entry_args(&EntryPoint::Template(QName::xsl("initial-template"))).unwrap(),
            vec!["-it"]
        );
        assert_eq!(
            entry_args(&EntryPoint::Template(QName::local("main"))).unwrap(),
            vec!["-it:main"]
        );
        assert!(entry_args(&EntryPoint::ApplyTemplates { select: None })
            .unwrap()
            .is_empty());
        assert!(entry_args(&EntryPoint::Function {
            name: QName::local("f"),
            arguments: vec![],
        })
        .is_err());
    }

    #[test]
    fn test_boolean_stylesheet_escapes_expression() {
        let xsl = boolean_stylesheet(r#"count(//a) < 3 and $result/x = "y""#, true);
        assert!(xsl.contains(r#"boolean(count(//a) &lt; 3 and $result/x = &quot;y&quot;)"#));
        assert!(xsl.contains(r#"match="/""#));
        assert!(roxmltree::Document::parse(&xsl).is_ok());
    }
}
