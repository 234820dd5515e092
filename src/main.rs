//! AKS stack MCP server: generate, validate and plan Pulumi programs for the
//! course and demo Azure deployments.

mod config;
mod error;
mod graph;
mod naming;
mod program;
mod resource_id;
mod roles;
mod scenarios;
mod tools;
mod types;

use rmcp::{
    handler::server::ServerHandler,
    model::{CallToolResult, Content},
    tool, tool_handler, tool_router,
    transport::stdio,
    ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct GenerateParams {
    /// Deployment definition: course or demo
    scenario: String,
    /// Stack config: Pulumi.<stage>.yaml contents or a flat JSON object of config keys (optional if stack_file is set)
    #[serde(default)]
    stack_config: Option<String>,
    /// Path to a Pulumi.<stage>.yaml file; the stage is taken from the file name (optional)
    #[serde(default)]
    stack_file: Option<String>,
    /// Stage (stack) name, e.g. dev (optional if given in stack_config)
    #[serde(default)]
    stage: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct ProgramParams {
    /// Pulumi YAML program
    program: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct DeriveNameParams {
    /// Resource kind (e.g. resource_group, container_registry) or its abbreviation (rg, acr)
    kind: String,
    /// Stage (stack) name
    stage: String,
    /// Application name
    application: String,
    /// Join parts without separators (forced for registries and storage accounts)
    #[serde(default)]
    no_separator: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct KubeletIdentityParams {
    /// Managed cluster identityProfile as JSON, or the kubelet identity resource id
    identity_profile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct RoleDefinitionsParams {
    /// Subscription id to expand role definition ids with (optional)
    #[serde(default)]
    subscription_id: Option<String>,
}

fn text_result(result: error::Result<String>) -> CallToolResult {
    match result {
        Ok(out) => CallToolResult::success(vec![Content::text(out)]),
        Err(e) => {
            tracing::warn!(error = %e, "tool call failed");
            CallToolResult::error(vec![Content::text(e.to_string())])
        }
    }
}

#[derive(Clone)]
struct AksStackMcpService {
    tool_router: rmcp::handler::server::tool::ToolRouter<Self>,
}

#[tool_router]
impl AksStackMcpService {
    fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Generate a Pulumi YAML program for the course or demo deployment from a stack config")]
    async fn generate_deployment_program(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<GenerateParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let p = params.0;
        tracing::info!(scenario = %p.scenario, stage = ?p.stage, "generate_deployment_program");
        let result = match (p.stack_file.as_deref(), p.stack_config.as_deref()) {
            (Some(file), _) => tools::deployment::generate_deployment_program_from_file(&p.scenario, file),
            (None, Some(config)) => {
                tools::deployment::generate_deployment_program(&p.scenario, config, p.stage.as_deref())
            }
            (None, None) => Err(error::Error::InvalidInput(
                "one of stack_config or stack_file is required".to_string(),
            )),
        };
        Ok(text_result(result))
    }

    #[tool(description = "Validate a Pulumi YAML program: references, ordering, cycles, resource groups, role assignments")]
    async fn validate_deployment_program(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<ProgramParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        match tools::deployment::validate_deployment_program(&params.0.program) {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text("Program is valid.")])),
            Err(errors) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Validation errors:\n{}",
                errors.join("\n")
            ))])),
        }
    }

    #[tool(description = "Group the declarations of a Pulumi YAML program into levels that can be created in parallel")]
    async fn plan_deployment_program(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<ProgramParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        Ok(text_result(tools::deployment::plan_deployment_program(&params.0.program)))
    }

    #[tool(description = "Derive a resource name from kind, stage and application")]
    async fn derive_resource_name(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<DeriveNameParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let p = params.0;
        Ok(text_result(tools::identity::derive_resource_name(
            &p.kind,
            &p.stage,
            &p.application,
            p.no_separator.unwrap_or(false),
        )))
    }

    #[tool(description = "Extract resource group and name of a managed cluster's kubelet identity")]
    async fn parse_kubelet_identity(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<KubeletIdentityParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        Ok(text_result(tools::identity::parse_kubelet_identity(&params.0.identity_profile)))
    }

    #[tool(description = "List the built-in Azure roles granted by the deployments, with role definition ids")]
    async fn list_role_definitions(
        &self,
        params: rmcp::handler::server::wrapper::Parameters<RoleDefinitionsParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        Ok(text_result(tools::reference::list_role_definitions_json(
            params.0.subscription_id.as_deref(),
        )))
    }

    #[tool(description = "List resource kinds with Pulumi types, name abbreviations and naming rules")]
    async fn list_resource_kinds(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        Ok(text_result(tools::reference::list_resource_kinds_json()))
    }
}

#[tool_handler]
impl ServerHandler for AksStackMcpService {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo::new(
            rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
        )
        .with_instructions(
            "MCP for AKS stacks: generate, validate and plan Pulumi programs for Azure resource graphs.",
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // stdout carries the MCP transport; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("starting aks-stack-mcp");
    let service = AksStackMcpService::new();
    let transport = stdio();
    let server = service.serve(transport).await?;
    server.waiting().await?;
    tracing::info!("aks-stack-mcp shutting down");
    Ok(())
}
