// Generate, validate and plan Pulumi programs for the deployment definitions.

use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::program;
use crate::scenarios::Scenario;
use serde_json::json;
use std::path::Path;

/// Builds the scenario's resource graph from a stack config and renders it.
///
/// `stack_config` is either the contents of a `Pulumi.<stage>.yaml` file or a
/// flat JSON object of config keys. `stage` may also be given as a config key.
pub fn generate_deployment_program(
    scenario: &str,
    stack_config: &str,
    stage: Option<&str>,
) -> Result<String> {
    let scenario = parse_scenario(scenario)?;
    let config = parse_stack_config(stack_config, stage.unwrap_or_default())?;
    generate(scenario, &config)
}

/// Same as [`generate_deployment_program`], reading a `Pulumi.<stage>.yaml` file.
pub fn generate_deployment_program_from_file(scenario: &str, stack_file: &str) -> Result<String> {
    let scenario = parse_scenario(scenario)?;
    let config = StackConfig::load(Path::new(stack_file))?;
    generate(scenario, &config)
}

fn parse_scenario(scenario: &str) -> Result<Scenario> {
    Scenario::parse(scenario).ok_or_else(|| {
        Error::InvalidInput(format!(
            "scenario must be one of: {}",
            Scenario::ALL.map(Scenario::as_str).join(", ")
        ))
    })
}

fn generate(scenario: Scenario, config: &StackConfig) -> Result<String> {
    let graph = scenario.build(config)?;
    graph.validate()?;
    tracing::info!(
        scenario = scenario.as_str(),
        stage = %config.stage,
        resources = graph.resources().count(),
        lookups = graph.lookups().count(),
        "generated deployment program"
    );
    program::render(&graph, &scenario.project_name(config), Some(scenario.description()))
}

fn parse_stack_config(input: &str, stage: &str) -> Result<StackConfig> {
    let config = if input.trim_start().starts_with('{') {
        StackConfig::from_json(stage, input)?
    } else {
        StackConfig::from_stack_yaml(stage, input)?
    };
    Ok(config)
}

/// Validates a Pulumi YAML program: structure, references, ordering, cycles,
/// resource-group sources and role assignments.
pub fn validate_deployment_program(program_yaml: &str) -> std::result::Result<(), Vec<String>> {
    let graph = program::validate_program(program_yaml)?;
    tracing::debug!(declarations = graph.len(), "program is valid");
    Ok(())
}

/// Validates a program and groups its declarations into execution levels.
pub fn plan_deployment_program(program_yaml: &str) -> Result<String> {
    let graph = program::validate_program(program_yaml).map_err(|errors| {
        Error::Program(format!("program is invalid:\n{}", errors.join("\n")))
    })?;
    if graph.is_empty() {
        return Err(Error::Program("program declares no resources or lookups".to_string()));
    }
    let levels = graph.execution_levels().map_err(|e| Error::Graph(vec![e]))?;
    let edges: Vec<_> = graph
        .declarations()
        .iter()
        .map(|d| {
            let name = d.logical_name.as_str();
            json!({
                "name": name,
                "type": d.token(),
                "dependsOn": graph.references_of(name).unwrap_or_default(),
                "dependents": graph.dependents_of(name).unwrap_or_default(),
            })
        })
        .collect();
    let plan = json!({
        "declarations": graph.len(),
        "levels": levels,
        "edges": edges,
    });
    Ok(serde_json::to_string_pretty(&plan)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO_STACK: &str = r#"
config:
  demo:application: demo
  demo:deployer: ops
  demo:private_dns_zone: privatelink.westeurope.azmk8s.io
  demo:tomtom_rg: shared-network
  demo:subnet_cidr: 10.40.1.0/24
  demo:tomtom_vnet: shared-vnet
"#;

    #[test]
    fn test_generate_demo_program() {
        let yaml = generate_deployment_program("demo", DEMO_STACK, Some("dev")).unwrap();
        assert!(yaml.starts_with("# Generated Pulumi program: demo\n"));
        assert!(yaml.contains("runtime: yaml"));
        assert!(yaml.contains("eventHubName: demo-stream-dev"));
        assert!(yaml.contains("registryName: demoacrdev"));
        assert!(yaml.contains("partitionCount: 10"));
        assert!(yaml.contains("messageRetentionInDays: 7"));
        assert!(validate_deployment_program(&yaml).is_ok());
    }

    #[test]
    fn test_generate_course_program_from_json() {
        let yaml = generate_deployment_program(
            "course",
            r#"{"stage":"dev","deployer":"ops","email":"ops@example.com"}"#,
            None,
        )
        .unwrap();
        assert!(yaml.contains("name: iac-course"));
        assert!(yaml.contains("type: azuread:ServicePrincipal"));
        assert!(validate_deployment_program(&yaml).is_ok());
    }

    #[test]
    fn test_generate_from_stack_file() {
        let dir = std::env::temp_dir().join(format!("aks-stack-mcp-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Pulumi.staging.yaml");
        std::fs::write(&path, DEMO_STACK).unwrap();
        let yaml = generate_deployment_program_from_file("demo", path.to_str().unwrap()).unwrap();
        assert!(yaml.contains("eventHubName: demo-stream-staging"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_generate_from_missing_file() {
        let err = generate_deployment_program_from_file("demo", "/nonexistent/Pulumi.dev.yaml").unwrap_err();
        assert!(err.to_string().contains("cannot read stack file"));
    }

    #[test]
    fn test_generate_unknown_scenario() {
        let err = generate_deployment_program("prod", "{}", Some("dev")).unwrap_err();
        assert!(err.to_string().contains("scenario must be one of: course, demo"));
    }

    #[test]
    fn test_generate_missing_stage() {
        let err = generate_deployment_program("course", "{}", None).unwrap_err();
        assert!(err.to_string().contains("'stage'"));
    }

    #[test]
    fn test_plan_demo_program() {
        let yaml = generate_deployment_program("demo", DEMO_STACK, Some("dev")).unwrap();
        let plan: serde_json::Value = serde_json::from_str(&plan_deployment_program(&yaml).unwrap()).unwrap();
        let levels = plan["levels"].as_array().unwrap();
        let first: Vec<&str> = levels[0].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert!(first.contains(&"clientConfig"));
        assert!(first.contains(&"existingResourceGroup"));
        assert!(first.contains(&"resourceGroup"));
        let position = |name: &str| {
            levels
                .iter()
                .position(|level| level.as_array().unwrap().iter().any(|v| v == name))
                .unwrap()
        };
        assert!(position("subnet") < position("aks"));
        assert!(position("aks") < position("kubeletIdentity"));
        assert!(position("kubeletIdentity") < position("acrRoleAssignment"));
        assert!(position("storageAccount") < position("eventHub"));

        let storage = plan["edges"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["name"] == "storageAccount")
            .unwrap();
        assert_eq!(storage["dependsOn"], serde_json::json!(["resourceGroup"]));
        assert_eq!(storage["dependents"], serde_json::json!(["eventHub"]));
    }

    #[test]
    fn test_plan_rejects_empty_program() {
        let err = plan_deployment_program("name: t\nruntime: yaml\n").unwrap_err();
        assert!(err.to_string().contains("declares no resources"));
    }

    #[test]
    fn test_plan_rejects_invalid_program() {
        let yaml = r#"
name: t
runtime: yaml
resources:
  a:
    type: azure-native:resources:ResourceGroup
    options:
      dependsOn:
        - ${b}
  b:
    type: azure-native:resources:ResourceGroup
    options:
      dependsOn:
        - ${a}
"#;
        let err = plan_deployment_program(yaml).unwrap_err();
        assert!(err.to_string().contains("dependency cycle"));
    }
}
