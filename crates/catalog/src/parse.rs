//! roxmltree walkers that turn catalog and test-set documents into the owned model.

use crate::assertion::parse_assertion;
use crate::error::CatalogError;
use crate::model::*;
use crate::uri::resolve_uri;
use log::warn;
use roxmltree::{Document, Node, ParsingOptions};
use xtdriver_traits::{QName, ResourceProvider, XSLT_NAMESPACE};

/// Parses `text` with DTDs allowed; catalogs and exceptions files may carry one.
pub(crate) fn parse_document<'input>(
    path: &str,
    text: &'input str,
) -> Result<Document<'input>, CatalogError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options).map_err(|e| CatalogError::xml(path, e))
}

/// Per-document parsing state: where the document lives and its raw text.
pub(crate) struct Context<'a> {
    pub path: &'a str,
    pub provider: &'a dyn ResourceProvider,
    input: &'a str,
}

impl<'a> Context<'a> {
    pub fn new(path: &'a str, provider: &'a dyn ResourceProvider, input: &'a str) -> Self {
        Self {
            path,
            provider,
            input,
        }
    }

    pub fn resolve(&self, href: &str) -> String {
        resolve_uri(href, Some(self.path))
    }

    /// Content of an element given either by `@file` or inline.
    ///
    /// Inline text (including CDATA) is returned decoded; inline markup is
    /// returned as written in the source document.
    pub fn content_of(&self, node: Node<'_, '_>) -> Result<String, String> {
        if let Some(file) = node.attribute("file") {
            let path = self.resolve(file);
            return self
                .provider
                .load_string(&path)
                .map_err(|e| format!("cannot read {}: {}", path, e));
        }
        Ok(self.inline_content(node))
    }

    fn inline_content(&self, node: Node<'_, '_>) -> String {
        let (Some(first), Some(last)) = (node.first_child(), node.last_child()) else {
            return String::new();
        };
        if node.children().all(|c| c.is_text()) {
            return node.children().filter_map(|c| c.text()).collect();
        }
        let range = first.range().start..last.range().end;
        self.input.get(range).unwrap_or_default().to_string()
    }
}

fn named<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

fn first_named<'a, 'input>(node: Node<'a, 'input>, name: &'static str) -> Option<Node<'a, 'input>> {
    named(node, name).next()
}

fn yes(value: Option<&str>) -> Option<bool> {
    match value?.trim() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn required<'n>(
    node: Node<'n, '_>,
    attribute: &str,
    ctx: &Context<'_>,
) -> Result<&'n str, CatalogError> {
    node.attribute(attribute).ok_or_else(|| {
        CatalogError::missing_attribute(ctx.path, node.tag_name().name(), attribute)
    })
}

/// Resolves a lexical QName attribute: `Q{uri}local`, `prefix:local` or `local`.
///
/// `#default` and `#unnamed` map into the XSLT namespace, as used for modes.
pub(crate) fn qname_attribute(node: Node<'_, '_>, attribute: &str) -> Option<QName> {
    let text = node.attribute(attribute)?.trim();
    match text {
        "#default" => return Some(QName::xsl("default")),
        "#unnamed" => return Some(QName::xsl("unnamed")),
        _ => {}
    }
    if let Some(name) = QName::parse_eqname(text) {
        return Some(name);
    }
    let (prefix, local) = text.split_once(':')?;
    match node.lookup_namespace_uri(Some(prefix)) {
        Some(uri) => Some(QName::new(Some(uri), local)),
        None => {
            warn!("Undeclared prefix '{}' in {}", prefix, text);
            None
        }
    }
}

/// `dependency` children (named by `@type`) then `dependencies/*` (named by element).
pub(crate) fn parse_dependencies(node: Node<'_, '_>) -> Vec<Dependency> {
    let legacy = named(node, "dependency").filter_map(|dep| {
        let kind = dep.attribute("type")?;
        Some(Dependency::new(
            kind,
            dep.attribute("value"),
            dep.attribute("satisfied") != Some("false"),
        ))
    });
    let grouped = named(node, "dependencies").flat_map(|deps| {
        deps.children().filter(Node::is_element).map(|dep| {
            Dependency::new(
                dep.tag_name().name(),
                dep.attribute("value"),
                dep.attribute("satisfied") != Some("false"),
            )
        })
    });
    legacy.chain(grouped).collect()
}

fn parse_output(node: Option<Node<'_, '_>>, ctx: &Context<'_>) -> OutputDecl {
    let Some(node) = node else {
        return OutputDecl::default();
    };
    OutputDecl {
        file: node.attribute("file").map(|f| ctx.resolve(f)),
        tree: yes(node.attribute("tree")),
        serialize: yes(node.attribute("serialize")),
    }
}

fn parse_params(node: Node<'_, '_>, ctx: &Context<'_>) -> Result<Vec<ParamDecl>, CatalogError> {
    named(node, "param")
        .map(|param| {
            let name = match qname_attribute(param, "name") {
                Some(name) => name,
                None => {
                    return Err(CatalogError::invalid(
                        ctx.path,
                        format!(
                            "parameter without a usable name: {:?}",
                            param.attribute("name")
                        ),
                    ));
                }
            };
            Ok(ParamDecl {
                name,
                select: param.attribute("select").map(str::to_string),
                source: param.attribute("source").map(|f| ctx.resolve(f)),
                is_static: yes(param.attribute("static")).unwrap_or(false),
                tunnel: yes(param.attribute("tunnel")).unwrap_or(false),
            })
        })
        .collect()
}

fn parse_source(node: Node<'_, '_>, ctx: &Context<'_>) -> SourceDecl {
    SourceDecl {
        role: node.attribute("role").map(str::to_string),
        file: node.attribute("file").map(|f| ctx.resolve(f)),
        content: first_named(node, "content").map(|c| ctx.inline_content(c)),
        uri: node.attribute("uri").map(str::to_string),
        validation: node.attribute("validation").map(str::to_string),
        streaming: yes(node.attribute("streaming")).unwrap_or(false),
    }
}

pub(crate) fn parse_environment(
    node: Node<'_, '_>,
    ctx: &Context<'_>,
) -> Result<EnvironmentDecl, CatalogError> {
    let mut env = EnvironmentDecl {
        name: node.attribute("name").map(str::to_string),
        declared_in: ctx.path.to_string(),
        dependencies: parse_dependencies(node),
        output: parse_output(first_named(node, "output"), ctx),
        params: parse_params(node, ctx)?,
        ..EnvironmentDecl::default()
    };

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "source" => env.sources.push(parse_source(child, ctx)),
            "schema" => env.schemas.push(SchemaDecl {
                role: child.attribute("role").map(str::to_string),
                file: child.attribute("file").map(|f| ctx.resolve(f)),
                uri: child.attribute("uri").map(str::to_string),
            }),
            "collation" => env.collations.push(CollationDecl {
                uri: required(child, "uri", ctx)?.to_string(),
                default: yes(child.attribute("default")).unwrap_or(false),
            }),
            "static-base-uri" => {
                env.static_base_uri = child.attribute("uri").map(str::to_string);
            }
            "context-item" => {
                env.context_item = child.attribute("select").map(str::to_string);
            }
            "stylesheet" => {
                if child.attribute("role") != Some("secondary") {
                    env.stylesheets
                        .push(ctx.resolve(required(child, "file", ctx)?));
                }
            }
            "package" => {
                if child.attribute("role") == Some("secondary") {
                    env.secondary_packages
                        .push(ctx.resolve(required(child, "file", ctx)?));
                }
            }
            "namespace" => env.namespaces.push((
                child.attribute("prefix").unwrap_or("").to_string(),
                required(child, "uri", ctx)?.to_string(),
            )),
            "resource" => env.resources.push(ResourceDecl {
                uri: required(child, "uri", ctx)?.to_string(),
                file: ctx.resolve(required(child, "file", ctx)?),
                media_type: child.attribute("media-type").map(str::to_string),
                encoding: child.attribute("encoding").map(str::to_string),
            }),
            "collection" => env.collections.push(CollectionDecl {
                uri: child.attribute("uri").unwrap_or("").to_string(),
                sources: named(child, "source")
                    .map(|s| parse_source(s, ctx))
                    .collect(),
            }),
            _ => {}
        }
    }
    Ok(env)
}

fn parse_test_input(
    node: Option<Node<'_, '_>>,
    ctx: &Context<'_>,
) -> Result<TestInput, CatalogError> {
    let Some(node) = node else {
        return Ok(TestInput::default());
    };
    let mut input = TestInput {
        params: parse_params(node, ctx)?,
        output: parse_output(first_named(node, "output"), ctx),
        ..TestInput::default()
    };
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "stylesheet" => {
                if child.attribute("role") != Some("secondary") {
                    input
                        .stylesheets
                        .push(ctx.resolve(required(child, "file", ctx)?));
                }
            }
            "package" => input.packages.push(PackageRef {
                file: ctx.resolve(required(child, "file", ctx)?),
                secondary: child.attribute("role") == Some("secondary"),
            }),
            "query" => input.query = Some(ctx.resolve(required(child, "file", ctx)?)),
            "initial-template" => {
                input.initial_template = Some(InitialTemplate {
                    name: qname_attribute(child, "name"),
                    params: parse_params(child, ctx)?,
                });
            }
            "initial-function" => {
                let name = qname_attribute(child, "name").ok_or_else(|| {
                    CatalogError::missing_attribute(ctx.path, "initial-function", "name")
                })?;
                input.initial_function = Some(InitialFunction {
                    name,
                    params: parse_params(child, ctx)?,
                });
            }
            "initial-mode" => {
                input.initial_mode = Some(InitialMode {
                    name: qname_attribute(child, "name"),
                    select: child.attribute("select").map(str::to_string),
                    params: parse_params(child, ctx)?,
                });
            }
            _ => {}
        }
    }
    Ok(input)
}

fn parse_test_case(node: Node<'_, '_>, ctx: &Context<'_>) -> Result<TestCase, CatalogError> {
    let environment = match first_named(node, "environment") {
        Some(env) => match env.attribute("ref") {
            Some(name) => Some(EnvironmentRef::Named(name.to_string())),
            None => Some(EnvironmentRef::Inline(Box::new(parse_environment(env, ctx)?))),
        },
        None => None,
    };
    let assertions: Vec<_> = first_named(node, "result")
        .map(|result| {
            result
                .children()
                .filter(Node::is_element)
                .map(|a| parse_assertion(a, ctx))
                .collect()
        })
        .unwrap_or_default();
    let result = match assertions.len() {
        0 => None,
        1 => assertions.into_iter().next(),
        _ => Some(crate::assertion::Assertion::AllOf(assertions)),
    };
    Ok(TestCase {
        name: required(node, "name", ctx)?.to_string(),
        dependencies: parse_dependencies(node),
        environment,
        test: parse_test_input(first_named(node, "test"), ctx)?,
        result,
    })
}

pub(crate) fn parse_catalog(
    doc: &Document<'_>,
    ctx: &Context<'_>,
) -> Result<Catalog, CatalogError> {
    let root = doc.root_element();
    if root.tag_name().namespace() != Some(crate::CATALOG_NAMESPACE) {
        warn!(
            "{}: root element is not in the test catalog namespace {}",
            ctx.path,
            crate::CATALOG_NAMESPACE
        );
    }
    let environments = root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "environment")
        .map(|env| parse_environment(env, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let test_sets = named(root, "test-set")
        .map(|set| {
            Ok(TestSetRef {
                name: required(set, "name", ctx)?.to_string(),
                file: ctx.resolve(required(set, "file", ctx)?),
            })
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;
    Ok(Catalog {
        file: ctx.path.to_string(),
        environments,
        dependencies: parse_dependencies(root),
        test_sets,
    })
}

pub(crate) fn parse_test_set(
    doc: &Document<'_>,
    ctx: &Context<'_>,
) -> Result<TestSet, CatalogError> {
    let root = doc.root_element();
    let environments = root
        .descendants()
        .filter(|n| {
            n.is_element() && n.tag_name().name() == "environment" && n.has_attribute("name")
        })
        .map(|env| parse_environment(env, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let test_cases = named(root, "test-case")
        .map(|case| parse_test_case(case, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TestSet {
        name: required(root, "name", ctx)?.to_string(),
        file: ctx.path.to_string(),
        dependencies: parse_dependencies(root),
        environments,
        test_cases,
    })
}

/// True when `name` belongs to the XSLT namespace.
pub fn is_xslt_name(name: &QName) -> bool {
    name.namespace.as_deref() == Some(XSLT_NAMESPACE)
}
