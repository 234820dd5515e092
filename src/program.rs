// Pulumi YAML rendering and parsing of resource graphs.

use crate::error::{Error, Result};
use crate::graph::{Declaration, ResourceGraph, Target};
use crate::types::{reference_str, ProgramDocument, ProgramOptions, ProgramResource, INVOKE_KEY, PROGRAM_RUNTIME};
use serde_json::{json, Map as JsonMap, Value};

/// Renders a graph as a Pulumi YAML program.
///
/// Lookups become `fn::invoke` variables, resources keep declaration order,
/// and `dependsOn` entries are written as `${name}` interpolations.
pub fn render(graph: &ResourceGraph, project: &str, description: Option<&str>) -> Result<String> {
    let mut doc = ProgramDocument {
        name: project.to_string(),
        runtime: PROGRAM_RUNTIME.to_string(),
        description: description.map(str::to_string),
        ..Default::default()
    };

    for d in graph.declarations() {
        match &d.target {
            Target::Lookup(function) => {
                let mut invoke = JsonMap::new();
                invoke.insert(
                    INVOKE_KEY.to_string(),
                    json!({ "function": function, "arguments": d.properties }),
                );
                doc.variables.insert(d.logical_name.clone(), Value::Object(invoke));
            }
            Target::Resource(token) => {
                let options = ProgramOptions {
                    depends_on: d
                        .options
                        .depends_on
                        .iter()
                        .map(|n| reference_str(n, ""))
                        .collect(),
                    delete_before_replace: d.options.delete_before_replace,
                };
                doc.resources.insert(
                    d.logical_name.clone(),
                    ProgramResource {
                        type_: token.clone(),
                        name: d.name.clone(),
                        properties: d.properties.clone(),
                        options: (options != ProgramOptions::default()).then_some(options),
                    },
                );
            }
        }
    }
    doc.outputs = graph.outputs().clone();

    let yaml = serde_yaml::to_string(&doc)?;
    let mut out = format!("# Generated Pulumi program: {}\n", project);
    if let Some(d) = description {
        out.push_str(&format!("# Description: {}\n", d));
    }
    out.push_str(&yaml);
    Ok(out)
}

/// Parses a Pulumi YAML program back into a graph.
///
/// Resources keep their order. Each lookup is placed right after the last
/// declaration it references, or ahead of all resources if it references
/// none, so a rendered graph reads back in a valid order.
pub fn parse(yaml: &str) -> Result<ResourceGraph> {
    let doc: ProgramDocument = serde_yaml::from_str(yaml)?;
    if doc.runtime != PROGRAM_RUNTIME {
        return Err(Error::Program(format!(
            "runtime must be '{}', found '{}'",
            PROGRAM_RUNTIME, doc.runtime
        )));
    }

    let mut declarations: Vec<Declaration> = Vec::with_capacity(doc.resources.len() + doc.variables.len());
    for (logical_name, resource) in doc.resources {
        let mut declaration = Declaration::new(logical_name.clone(), Target::Resource(resource.type_));
        declaration.name = resource.name;
        declaration.properties = resource.properties;
        if let Some(options) = resource.options {
            declaration.options.delete_before_replace = options.delete_before_replace;
            for entry in options.depends_on {
                declaration.options.depends_on.push(depends_on_target(&logical_name, &entry)?);
            }
        }
        declarations.push(declaration);
    }

    let mut leading = 0;
    for (logical_name, value) in doc.variables {
        let lookup = parse_lookup(&logical_name, value)?;
        let after = lookup
            .references()
            .iter()
            .filter_map(|r| declarations.iter().position(|d| &d.logical_name == r))
            .max();
        let at = match after {
            Some(p) => p + 1,
            None => leading,
        };
        if at <= leading {
            leading += 1;
        }
        declarations.insert(at, lookup);
    }

    let mut graph = ResourceGraph::new();
    for d in declarations {
        graph.declare(d);
    }
    for (key, value) in doc.outputs {
        graph.output(&key, value);
    }
    Ok(graph)
}

fn parse_lookup(logical_name: &str, value: Value) -> Result<Declaration> {
    let invoke = match value {
        Value::Object(mut map) if map.len() == 1 => map.remove(INVOKE_KEY),
        _ => None,
    }
    .ok_or_else(|| Error::Program(format!("variable '{}' is not a provider lookup", logical_name)))?;

    let function = invoke
        .get("function")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Program(format!("lookup '{}' has no function", logical_name)))?;
    let arguments = match invoke.get("arguments") {
        Some(Value::Object(args)) => args.clone(),
        None | Some(Value::Null) => JsonMap::new(),
        Some(_) => {
            return Err(Error::Program(format!(
                "lookup '{}' arguments must be a mapping",
                logical_name
            )))
        }
    };

    let mut declaration = Declaration::new(logical_name, Target::Lookup(function.to_string()));
    declaration.properties = arguments;
    Ok(declaration)
}

fn depends_on_target(from: &str, entry: &str) -> Result<String> {
    entry
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .filter(|s| !s.is_empty() && !s.contains(['.', '[']))
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Program(format!(
                "'{}' dependsOn entry '{}' must be a resource reference like ${{name}}",
                from, entry
            ))
        })
}

/// Parses and validates a program; returns every problem found.
pub fn validate_program(yaml: &str) -> std::result::Result<ResourceGraph, Vec<String>> {
    let graph = parse(yaml).map_err(|e| vec![e.to_string()])?;
    graph
        .validate()
        .map_err(|errors| errors.iter().map(ToString::to_string).collect::<Vec<_>>())?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{reference, LookupFunction, ResourceKind};

    fn graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph.declare(
            Declaration::resource(ResourceKind::ResourceGroup, "rg")
                .named("demo-rg-dev")
                .property("resourceGroupName", "demo-rg-dev"),
        );
        graph.declare(
            Declaration::resource(ResourceKind::ManagedCluster, "aks")
                .property("resourceGroupName", reference("rg", "name"))
                .delete_before_replace()
                .depends_on("rg"),
        );
        graph.declare(
            Declaration::lookup(LookupFunction::UserAssignedIdentity, "kubeletIdentity")
                .property("resourceName", reference("aks", "name")),
        );
        graph.output("cluster", reference("aks", "name"));
        graph
    }

    #[test]
    fn test_render_program() {
        let yaml = render(&graph(), "demo", Some("demo stack")).unwrap();
        assert!(yaml.starts_with("# Generated Pulumi program: demo\n# Description: demo stack\n"));
        assert!(yaml.contains("runtime: yaml"));
        assert!(yaml.contains("type: azure-native:containerservice:ManagedCluster"));
        assert!(yaml.contains("fn::invoke:"));
        assert!(yaml.contains("function: azure-native:managedidentity:getUserAssignedIdentity"));
        assert!(yaml.contains("deleteBeforeReplace: true"));
        assert!(yaml.contains("${rg}"));
        assert!(yaml.contains("name: demo-rg-dev"));
        let rg_pos = yaml.find("  rg:").unwrap();
        let aks_pos = yaml.find("  aks:").unwrap();
        assert!(rg_pos < aks_pos);
    }

    #[test]
    fn test_parse_places_lookup_after_its_references() {
        let yaml = render(&graph(), "demo", None).unwrap();
        let parsed = parse(&yaml).unwrap();
        let names: Vec<&str> = parsed.declarations().iter().map(|d| d.logical_name.as_str()).collect();
        assert_eq!(names, vec!["rg", "aks", "kubeletIdentity"]);
        assert_eq!(parsed.get("aks").unwrap().options.depends_on, vec!["rg"]);
        assert!(parsed.get("aks").unwrap().options.delete_before_replace);
        assert_eq!(parsed.get("rg").unwrap().name.as_deref(), Some("demo-rg-dev"));
        assert_eq!(parsed.outputs().len(), 1);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_parse_leading_lookups_keep_order() {
        let yaml = r#"
name: t
runtime: yaml
variables:
  clientConfig:
    fn::invoke:
      function: azure-native:authorization:getClientConfig
  shared:
    fn::invoke:
      function: azure-native:resources:getResourceGroup
      arguments:
        resourceGroupName: shared
resources:
  subnet:
    type: azure-native:network:Subnet
    properties:
      resourceGroupName: ${shared.name}
"#;
        let graph = parse(yaml).unwrap();
        let names: Vec<&str> = graph.declarations().iter().map(|d| d.logical_name.as_str()).collect();
        assert_eq!(names, vec!["clientConfig", "shared", "subnet"]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_plain_variables() {
        let yaml = "name: t\nruntime: yaml\nvariables:\n  x: 3\n";
        let err = parse(yaml).unwrap_err();
        assert!(err.to_string().contains("not a provider lookup"));
    }

    #[test]
    fn test_parse_rejects_bad_depends_on() {
        let yaml = r#"
name: t
runtime: yaml
resources:
  rg:
    type: azure-native:resources:ResourceGroup
    options:
      dependsOn:
        - other
"#;
        let err = parse(yaml).unwrap_err();
        assert!(err.to_string().contains("dependsOn entry 'other'"));
    }

    #[test]
    fn test_parse_rejects_other_runtime() {
        let err = parse("name: t\nruntime: nodejs\n").unwrap_err();
        assert!(err.to_string().contains("runtime must be 'yaml'"));
    }

    #[test]
    fn test_validate_program_reports_dangling_reference() {
        let yaml = r#"
name: t
runtime: yaml
resources:
  acr:
    type: azure-native:containerregistry:Registry
    properties:
      resourceGroupName: ${rg.name}
"#;
        let errors = validate_program(yaml).unwrap_err();
        assert_eq!(errors, vec!["'acr' references undeclared 'rg'".to_string()]);
    }
}
