//! Deployment definitions and the declarations they share.
//!
//! Each scenario builds one resource graph from a [`StackConfig`]. Nothing is
//! shared between graphs; only the helpers that shape common declarations
//! (tags, role assignments, the cluster, the SSH key) live here.

pub mod course;
pub mod demo;

use crate::config::StackConfig;
use crate::error::Result;
use crate::graph::{Declaration, ResourceGraph};
use crate::roles::BuiltinRole;
use crate::types::{reference, reference_str, LookupFunction, ResourceKind};
use serde_json::{json, Map as JsonMap, Value};

pub const CLIENT_CONFIG: &str = "clientConfig";
pub const SERVICE_PRINCIPAL_TYPE: &str = "ServicePrincipal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Course,
    Demo,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::Course, Scenario::Demo];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "course" => Some(Scenario::Course),
            "demo" => Some(Scenario::Demo),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Course => "course",
            Scenario::Demo => "demo",
        }
    }

    pub fn build(self, config: &StackConfig) -> Result<ResourceGraph> {
        let graph = match self {
            Scenario::Course => course::build(config)?,
            Scenario::Demo => demo::build(config)?,
        };
        tracing::debug!(
            scenario = self.as_str(),
            stage = %config.stage,
            declarations = graph.len(),
            "built resource graph"
        );
        Ok(graph)
    }

    /// Pulumi project name of the rendered program.
    pub fn project_name(self, config: &StackConfig) -> String {
        match self {
            Scenario::Course => course::PROJECT.to_string(),
            Scenario::Demo => config
                .application
                .clone()
                .unwrap_or_else(|| Scenario::Demo.as_str().to_string()),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scenario::Course => "AKS cluster with a service principal, registry and dedicated network",
            Scenario::Demo => "AKS cluster in a shared network with registry, DNS access and event ingestion",
        }
    }
}

/// Tags attached to every taggable resource; unset values are left out.
pub(crate) fn tags(pairs: &[(&str, Option<&str>)]) -> Value {
    let mut map = JsonMap::new();
    for (key, value) in pairs {
        if let Some(value) = value {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(map)
}

pub(crate) fn client_config() -> Declaration {
    Declaration::lookup(LookupFunction::ClientConfig, CLIENT_CONFIG)
}

/// Role assignment binding `principal` to `role` on `scope`; both are
/// interpolations of earlier declarations.
pub(crate) fn role_assignment(
    logical_name: &str,
    principal: Value,
    role: BuiltinRole,
    scope: Value,
) -> Declaration {
    let subscription = reference_str(CLIENT_CONFIG, "subscriptionId");
    Declaration::resource(ResourceKind::RoleAssignment, logical_name)
        .property("principalId", principal)
        .property("principalType", SERVICE_PRINCIPAL_TYPE)
        .property("roleDefinitionId", role.definition_id(&subscription))
        .property("scope", scope)
}

pub(crate) fn ssh_key(logical_name: &str) -> Declaration {
    Declaration::resource(ResourceKind::PrivateKey, logical_name)
        .property("algorithm", "RSA")
        .property("rsaBits", 4096)
}

/// Shape of the managed cluster both definitions declare.
pub(crate) struct ClusterSpec<'a> {
    pub logical_name: &'a str,
    pub cluster_name: &'a str,
    pub resource_group: &'a str,
    pub subnet: &'a str,
    pub ssh_key: &'a str,
    pub dns_prefix: &'a str,
    pub node_count: u32,
    pub tags: Value,
}

pub(crate) const NODE_VM_SIZE: &str = "Standard_DS2_v2";
pub(crate) const NODE_MAX_PODS: u32 = 110;
pub(crate) const ADMIN_USERNAME: &str = "testuser";

pub(crate) fn managed_cluster(spec: ClusterSpec<'_>) -> Declaration {
    Declaration::resource(ResourceKind::ManagedCluster, spec.logical_name)
        .property("resourceName", spec.cluster_name)
        .property("resourceGroupName", reference(spec.resource_group, "name"))
        .property(
            "agentPoolProfiles",
            json!([{
                "availabilityZones": ["1", "2", "3"],
                "count": spec.node_count,
                "enableNodePublicIP": true,
                "maxPods": NODE_MAX_PODS,
                "mode": "System",
                "name": "agentpool1",
                "osType": "Linux",
                "type": "VirtualMachineScaleSets",
                "vmSize": NODE_VM_SIZE,
                "vnetSubnetID": reference_str(spec.subnet, "id"),
            }]),
        )
        .property("dnsPrefix", spec.dns_prefix)
        .property("enableRBAC", true)
        .property("identity", json!({ "type": "SystemAssigned" }))
        .property(
            "networkProfile",
            json!({
                "loadBalancerProfile": { "managedOutboundIPs": { "count": 2 } },
                "loadBalancerSku": "standard",
                "outboundType": "loadBalancer",
                "networkPlugin": "kubenet",
            }),
        )
        .property(
            "autoScalerProfile",
            json!({ "scaleDownDelayAfterAdd": "15m", "scanInterval": "20s" }),
        )
        .property(
            "linuxProfile",
            json!({
                "adminUsername": ADMIN_USERNAME,
                "ssh": { "publicKeys": [{ "keyData": reference_str(spec.ssh_key, "publicKeyOpenssh") }] },
            }),
        )
        .property("tags", spec.tags)
        .delete_before_replace()
        .depends_on(spec.subnet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_parse() {
        assert_eq!(Scenario::parse(" Demo "), Some(Scenario::Demo));
        assert_eq!(Scenario::parse("course"), Some(Scenario::Course));
        assert_eq!(Scenario::parse("prod"), None);
    }

    #[test]
    fn test_tags_skip_unset_values() {
        let tags = tags(&[("stage", Some("dev")), ("deployer", None)]);
        assert_eq!(tags, json!({"stage": "dev"}));
    }

    #[test]
    fn test_role_assignment_shape() {
        let d = role_assignment(
            "acrPull",
            reference("kubeletIdentity", "principalId"),
            BuiltinRole::AcrPull,
            reference("acr", "id"),
        );
        assert_eq!(d.properties["principalType"], "ServicePrincipal");
        assert_eq!(
            d.properties["roleDefinitionId"],
            "/subscriptions/${clientConfig.subscriptionId}/providers/Microsoft.Authorization/roleDefinitions/7f951dda-4ed3-4680-a7ca-43fe172d538d"
        );
        assert_eq!(d.references(), vec!["kubeletIdentity", "clientConfig", "acr"]);
    }

    #[test]
    fn test_managed_cluster_waits_for_subnet() {
        let d = managed_cluster(ClusterSpec {
            logical_name: "aks",
            cluster_name: "aks-demo-dev",
            resource_group: "rg",
            subnet: "subnet",
            ssh_key: "sshKey",
            dns_prefix: "demo-aks-dev-dns",
            node_count: 3,
            tags: json!({}),
        });
        assert_eq!(d.options.depends_on, vec!["subnet"]);
        assert!(d.options.delete_before_replace);
        assert_eq!(d.properties["agentPoolProfiles"][0]["count"], 3);
        assert_eq!(d.properties["agentPoolProfiles"][0]["vnetSubnetID"], "${subnet.id}");
        assert_eq!(d.references(), vec!["rg", "subnet", "sshKey"]);
    }
}
