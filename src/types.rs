// Resource kinds, provider function tokens and the Pulumi YAML document shape.
// Rendering builds these structs; validation parses YAML back into them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

pub const PROGRAM_RUNTIME: &str = "yaml";
pub const INVOKE_KEY: &str = "fn::invoke";

/// Managed resource kinds the deployment definitions declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    VirtualNetwork,
    Subnet,
    ContainerRegistry,
    ManagedCluster,
    RoleAssignment,
    StorageAccount,
    EventHubNamespace,
    EventHub,
    AuthorizationRule,
    AdApplication,
    ServicePrincipal,
    PrivateKey,
}

/// Length and character constraints a derived name must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRule {
    pub min_len: usize,
    pub max_len: usize,
    /// Separators are not allowed at all (registries, storage accounts).
    pub compact: bool,
    pub starts_with_letter: bool,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 13] = [
        ResourceKind::ResourceGroup,
        ResourceKind::VirtualNetwork,
        ResourceKind::Subnet,
        ResourceKind::ContainerRegistry,
        ResourceKind::ManagedCluster,
        ResourceKind::RoleAssignment,
        ResourceKind::StorageAccount,
        ResourceKind::EventHubNamespace,
        ResourceKind::EventHub,
        ResourceKind::AuthorizationRule,
        ResourceKind::AdApplication,
        ResourceKind::ServicePrincipal,
        ResourceKind::PrivateKey,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "azure-native:resources:ResourceGroup",
            ResourceKind::VirtualNetwork => "azure-native:network:VirtualNetwork",
            ResourceKind::Subnet => "azure-native:network:Subnet",
            ResourceKind::ContainerRegistry => "azure-native:containerregistry:Registry",
            ResourceKind::ManagedCluster => "azure-native:containerservice:ManagedCluster",
            ResourceKind::RoleAssignment => "azure-native:authorization:RoleAssignment",
            ResourceKind::StorageAccount => "azure-native:storage:StorageAccount",
            ResourceKind::EventHubNamespace => "azure-native:eventhub:Namespace",
            ResourceKind::EventHub => "azure-native:eventhub:EventHub",
            ResourceKind::AuthorizationRule => "azure-native:eventhub:NamespaceAuthorizationRule",
            ResourceKind::AdApplication => "azuread:Application",
            ResourceKind::ServicePrincipal => "azuread:ServicePrincipal",
            ResourceKind::PrivateKey => "tls:PrivateKey",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.token() == token)
    }

    /// Abbreviation used as the middle part of derived names.
    pub fn abbreviation(self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "rg",
            ResourceKind::VirtualNetwork => "vnet",
            ResourceKind::Subnet => "subnet",
            ResourceKind::ContainerRegistry => "acr",
            ResourceKind::ManagedCluster => "aks",
            ResourceKind::RoleAssignment => "ra",
            ResourceKind::StorageAccount => "storage",
            ResourceKind::EventHubNamespace => "evh-namespace",
            ResourceKind::EventHub => "stream",
            ResourceKind::AuthorizationRule => "authorization",
            ResourceKind::AdApplication => "app",
            ResourceKind::ServicePrincipal => "sp",
            ResourceKind::PrivateKey => "pk",
        }
    }

    pub fn name_rule(self) -> NameRule {
        let (min_len, max_len, compact, starts_with_letter) = match self {
            ResourceKind::ResourceGroup => (1, 90, false, false),
            ResourceKind::ContainerRegistry => (5, 50, true, false),
            ResourceKind::StorageAccount => (3, 24, true, false),
            ResourceKind::ManagedCluster => (1, 63, false, false),
            ResourceKind::EventHubNamespace => (6, 50, false, true),
            ResourceKind::EventHub | ResourceKind::AuthorizationRule => (1, 256, false, false),
            _ => (1, 80, false, false),
        };
        NameRule {
            min_len,
            max_len,
            compact,
            starts_with_letter,
        }
    }

    /// Accepts the snake_case kind name or its abbreviation.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s || k.abbreviation() == s)
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resource_group",
            ResourceKind::VirtualNetwork => "virtual_network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::ContainerRegistry => "container_registry",
            ResourceKind::ManagedCluster => "managed_cluster",
            ResourceKind::RoleAssignment => "role_assignment",
            ResourceKind::StorageAccount => "storage_account",
            ResourceKind::EventHubNamespace => "event_hub_namespace",
            ResourceKind::EventHub => "event_hub",
            ResourceKind::AuthorizationRule => "authorization_rule",
            ResourceKind::AdApplication => "ad_application",
            ResourceKind::ServicePrincipal => "service_principal",
            ResourceKind::PrivateKey => "private_key",
        }
    }
}

/// Provider functions used to look up objects that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupFunction {
    ClientConfig,
    ResourceGroup,
    PrivateZone,
    UserAssignedIdentity,
}

impl LookupFunction {
    pub const ALL: [LookupFunction; 4] = [
        LookupFunction::ClientConfig,
        LookupFunction::ResourceGroup,
        LookupFunction::PrivateZone,
        LookupFunction::UserAssignedIdentity,
    ];

    pub fn token(self) -> &'static str {
        match self {
            LookupFunction::ClientConfig => "azure-native:authorization:getClientConfig",
            LookupFunction::ResourceGroup => "azure-native:resources:getResourceGroup",
            LookupFunction::PrivateZone => "azure-native:network:getPrivateZone",
            LookupFunction::UserAssignedIdentity => "azure-native:managedidentity:getUserAssignedIdentity",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.token() == token)
    }
}

/// Top-level Pulumi YAML program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramDocument {
    pub name: String,
    pub runtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub resources: IndexMap<String, ProgramResource>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramResource {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub properties: JsonMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProgramOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete_before_replace: bool,
}

/// `${name}` or `${name.path}` interpolation pointing at another declaration.
pub fn reference(name: &str, path: &str) -> Value {
    Value::String(reference_str(name, path))
}

pub fn reference_str(name: &str, path: &str) -> String {
    if path.is_empty() {
        format!("${{{}}}", name)
    } else {
        format!("${{{}.{}}}", name, path)
    }
}

/// Root declaration names of every interpolation inside a string, in order.
/// `$${` is the escape for a literal `${` and is skipped.
pub fn interpolation_roots(s: &str) -> Vec<String> {
    let mut roots = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'$' {
            i += 2;
            continue;
        }
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let start = i + 2;
            match s[start..].find('}') {
                Some(end) => {
                    let expr = &s[start..start + end];
                    let root: String = expr
                        .chars()
                        .take_while(|c| *c != '.' && *c != '[')
                        .collect();
                    let root = root.trim();
                    if !root.is_empty() {
                        roots.push(root.to_string());
                    }
                    i = start + end + 1;
                }
                None => break,
            }
        } else {
            i += 1;
        }
    }
    roots
}

/// Collects interpolation roots from every string in a value tree.
pub fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(interpolation_roots(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}
