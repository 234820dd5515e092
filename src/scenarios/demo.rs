// Demo scenario: cluster placed in an existing shared network, with access to
// a private DNS zone and an event hub that archives to blob storage.

use super::{client_config, managed_cluster, role_assignment, ssh_key, tags, ClusterSpec};
use crate::config::StackConfig;
use crate::error::Result;
use crate::graph::{Declaration, ResourceGraph};
use crate::naming::{self, derive_name};
use crate::resource_id::{
    KubeletIdentity, IDENTITY_NAME_SEGMENT, KUBELET_IDENTITY_KEY, RESOURCE_GROUP_SEGMENT,
};
use crate::roles::BuiltinRole;
use crate::types::{reference, reference_str, LookupFunction, ResourceKind};
use serde_json::{json, Value};

pub const NODE_COUNT: u32 = 3;
pub const PARTITION_COUNT: u32 = 10;
pub const MESSAGE_RETENTION_DAYS: u32 = 7;
pub const CAPTURE_INTERVAL_SECONDS: u32 = 120;
pub const CAPTURE_SIZE_LIMIT_BYTES: u64 = 10_485_763;
pub const ARCHIVE_NAME_FORMAT: &str =
    "{Namespace}/{EventHub}/{PartitionId}/{Year}/{Month}/{Day}/{Hour}/{Minute}/{Second}";
pub const ARCHIVE_DESTINATION: &str = "EventHubArchive.AzureBlockBlob";

const EXISTING_RESOURCE_GROUP: &str = "existingResourceGroup";
const EXISTING_PRIVATE_DNS: &str = "existingPrivateDns";
const KUBELET_IDENTITY: &str = "kubeletIdentity";

pub fn build(config: &StackConfig) -> Result<ResourceGraph> {
    let stage = config.require_stage()?;
    let application = config.require_application()?;
    let private_dns_zone = config.require_private_dns_zone()?;
    let external_rg = config.require_external_resource_group()?;
    let subnet_cidr = config.require_subnet_cidr()?;
    let external_vnet = config.require_external_vnet()?;
    let location = config.location();

    let tags = tags(&[
        ("stage", Some(stage)),
        ("deployer", config.deployer.as_deref()),
        ("application", Some(application)),
    ]);
    let name = |kind: ResourceKind| derive_name(kind, stage, application, false);

    let mut graph = ResourceGraph::new();
    graph.declare(client_config());
    let existing_rg = graph.declare(
        Declaration::lookup(LookupFunction::ResourceGroup, EXISTING_RESOURCE_GROUP)
            .property("resourceGroupName", external_rg),
    );
    let existing_dns = graph.declare(
        Declaration::lookup(LookupFunction::PrivateZone, EXISTING_PRIVATE_DNS)
            .property("privateZoneName", private_dns_zone)
            .property("resourceGroupName", reference(&existing_rg, "name")),
    );

    let rg_name = name(ResourceKind::ResourceGroup)?;
    let rg = graph.declare(
        Declaration::resource(ResourceKind::ResourceGroup, "resourceGroup")
            .named(rg_name.clone())
            .property("location", location)
            .property("resourceGroupName", rg_name)
            .property("tags", tags.clone()),
    );

    let subnet_name = name(ResourceKind::Subnet)?;
    let subnet = graph.declare(
        Declaration::resource(ResourceKind::Subnet, "subnet")
            .named(subnet_name.clone())
            .property("addressPrefix", subnet_cidr)
            .property("resourceGroupName", reference(&existing_rg, "name"))
            .property("subnetName", subnet_name)
            .property("virtualNetworkName", external_vnet),
    );

    let registry_name = derive_name(ResourceKind::ContainerRegistry, stage, application, true)?;
    let acr = graph.declare(
        Declaration::resource(ResourceKind::ContainerRegistry, "containerRegistry")
            .named(registry_name.clone())
            .property("adminUserEnabled", true)
            .property("registryName", registry_name)
            .property("resourceGroupName", reference(&rg, "name"))
            .property("sku", json!({ "name": "Standard" }))
            .property("tags", tags.clone()),
    );

    let key = graph.declare(ssh_key("sshKey").named(name(ResourceKind::PrivateKey)?));

    let cluster_name = naming::cluster_name(stage, application)?;
    let dns_prefix = format!("{}-dns", name(ResourceKind::ManagedCluster)?);
    let aks = graph.declare(
        managed_cluster(ClusterSpec {
            logical_name: "aks",
            cluster_name: &cluster_name,
            resource_group: &rg,
            subnet: &subnet,
            ssh_key: &key,
            dns_prefix: &dns_prefix,
            node_count: NODE_COUNT,
            tags: tags.clone(),
        })
        .named(cluster_name.clone()),
    );

    let kubelet = graph.declare(kubelet_identity_lookup(
        &aks,
        config.kubelet_identity_resource_id.as_deref(),
    )?);

    let storage_name = name(ResourceKind::StorageAccount)?;
    let storage = graph.declare(
        Declaration::resource(ResourceKind::StorageAccount, "storageAccount")
            .named(storage_name.clone())
            .property("accountName", storage_name)
            .property("resourceGroupName", reference(&rg, "name"))
            .property("allowBlobPublicAccess", false)
            .property("allowSharedKeyAccess", true)
            .property("minimumTlsVersion", "TLS1_2")
            .property(
                "encryption",
                json!({
                    "keySource": "Microsoft.Storage",
                    "services": {
                        "blob": { "enabled": true, "keyType": "Account" },
                        "file": { "enabled": true, "keyType": "Account" },
                    },
                }),
            )
            .property("sku", json!({ "name": "Standard_LRS" }))
            .property("kind", "StorageV2")
            .property("tags", tags.clone()),
    );

    let namespace_name = name(ResourceKind::EventHubNamespace)?;
    let namespace = graph.declare(
        Declaration::resource(ResourceKind::EventHubNamespace, "eventHubNamespace")
            .named(namespace_name.clone())
            .property("location", location)
            .property("namespaceName", namespace_name)
            .property("resourceGroupName", reference(&rg, "name"))
            .property("sku", json!({ "name": "Standard", "tier": "Standard" }))
            .property("tags", tags),
    );

    let event_hub_name = name(ResourceKind::EventHub)?;
    let blob_container = naming::blob_container_name(stage, application)?;
    let event_hub = graph.declare(
        Declaration::resource(ResourceKind::EventHub, "eventHub")
            .named(event_hub_name.clone())
            .property(
                "captureDescription",
                json!({
                    "destination": {
                        "archiveNameFormat": ARCHIVE_NAME_FORMAT,
                        "blobContainer": blob_container,
                        "name": ARCHIVE_DESTINATION,
                        "storageAccountResourceId": reference_str(&storage, "id"),
                    },
                    "enabled": true,
                    "encoding": "Avro",
                    "intervalInSeconds": CAPTURE_INTERVAL_SECONDS,
                    "sizeLimitInBytes": CAPTURE_SIZE_LIMIT_BYTES,
                }),
            )
            .property("eventHubName", event_hub_name)
            .property("messageRetentionInDays", MESSAGE_RETENTION_DAYS)
            .property("namespaceName", reference(&namespace, "name"))
            .property("partitionCount", PARTITION_COUNT)
            .property("resourceGroupName", reference(&rg, "name"))
            .property("status", "Active")
            .depends_on(&storage),
    );

    let rule_name = name(ResourceKind::AuthorizationRule)?;
    graph.declare(
        Declaration::resource(ResourceKind::AuthorizationRule, "namespaceAuthorizationRule")
            .named(rule_name.clone())
            .property("authorizationRuleName", rule_name)
            .property("namespaceName", reference(&namespace, "name"))
            .property("resourceGroupName", reference(&rg, "name"))
            .property("rights", json!(["Listen", "Send"])),
    );

    let kubelet_principal = || reference(&kubelet, "principalId");
    graph.declare(role_assignment(
        "acrRoleAssignment",
        kubelet_principal(),
        BuiltinRole::AcrPull,
        reference(&acr, "id"),
    ));
    graph.declare(role_assignment(
        "networkContributorRoleAssignment",
        reference(&aks, "identity.principalId"),
        BuiltinRole::NetworkContributor,
        reference(&subnet, "id"),
    ));
    graph.declare(role_assignment(
        "privateDnsReaderRoleAssignment",
        kubelet_principal(),
        BuiltinRole::GeneralReader,
        reference(&existing_rg, "id"),
    ));
    graph.declare(role_assignment(
        "privateDnsContributorRoleAssignment",
        kubelet_principal(),
        BuiltinRole::PrivateDnsContributor,
        reference(&existing_dns, "id"),
    ));
    graph.declare(role_assignment(
        "eventHubReceiverRoleAssignment",
        kubelet_principal(),
        BuiltinRole::EventHubReceiver,
        reference(&namespace, "id"),
    ));
    graph.declare(role_assignment(
        "eventHubSenderRoleAssignment",
        kubelet_principal(),
        BuiltinRole::EventHubSender,
        reference(&namespace, "id"),
    ));

    graph.output("resourceGroupName", reference(&rg, "name"));
    graph.output("clusterName", reference(&aks, "name"));
    graph.output("registryLoginServer", reference(&acr, "loginServer"));
    graph.output("eventHubName", reference(&event_hub, "name"));
    graph.output("kubeletPrincipalId", kubelet_principal());
    Ok(graph)
}

/// Lookup of the identity AKS creates for its node pool.
///
/// With a known resource id the arguments are parsed here and written as
/// literals. Otherwise the engine selects them from the cluster's identity
/// profile once the cluster exists.
fn kubelet_identity_lookup(aks: &str, resource_id: Option<&str>) -> Result<Declaration> {
    let lookup = Declaration::lookup(LookupFunction::UserAssignedIdentity, KUBELET_IDENTITY);
    let lookup = match resource_id {
        Some(id) => {
            let identity = KubeletIdentity::from_resource_id(id)?;
            tracing::info!(
                resource_group = %identity.resource_group,
                name = %identity.name,
                "using known kubelet identity"
            );
            lookup
                .property("resourceGroupName", identity.resource_group)
                .property("resourceName", identity.name)
        }
        None => {
            let id = reference_str(
                aks,
                &format!("identityProfile[\"{}\"].resourceId", KUBELET_IDENTITY_KEY),
            );
            lookup
                .property("resourceGroupName", select_segment(&id, RESOURCE_GROUP_SEGMENT))
                .property("resourceName", select_segment(&id, IDENTITY_NAME_SEGMENT))
        }
    };
    Ok(lookup)
}

fn select_segment(id: &str, index: usize) -> Value {
    json!({ "fn::select": [index, { "fn::split": ["/", id] }] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::program;

    const KUBELET_ID: &str = "/subscriptions/s/resourceGroups/MC_demo-rg-dev_aks-demo-dev_WestEurope/providers/Microsoft.ManagedIdentity/userAssignedIdentities/aks-demo-dev-agentpool";

    fn config() -> StackConfig {
        let yaml = r#"
config:
  demo:application: demo
  demo:deployer: ops
  demo:private_dns_zone: privatelink.westeurope.azmk8s.io
  demo:tomtom_rg: shared-network
  demo:subnet_cidr: 10.40.1.0/24
  demo:tomtom_vnet: shared-vnet
"#;
        StackConfig::from_stack_yaml("dev", yaml).unwrap()
    }

    fn physical_name<'a>(graph: &'a ResourceGraph, logical: &str) -> &'a str {
        graph.get(logical).unwrap().name.as_deref().unwrap()
    }

    #[test]
    fn test_demo_dev_names() {
        let graph = build(&config()).unwrap();
        assert_eq!(physical_name(&graph, "resourceGroup"), "demo-rg-dev");
        assert_eq!(physical_name(&graph, "subnet"), "demo-subnet-dev");
        assert_eq!(physical_name(&graph, "containerRegistry"), "demoacrdev");
        assert_eq!(physical_name(&graph, "storageAccount"), "demostoragedev");
        assert_eq!(physical_name(&graph, "aks"), "aks-demo-dev");
        assert_eq!(physical_name(&graph, "eventHubNamespace"), "demo-evh-namespace-dev");
        assert_eq!(physical_name(&graph, "namespaceAuthorizationRule"), "demo-authorization-dev");
        assert!(!physical_name(&graph, "containerRegistry").contains(['-', '_']));
    }

    #[test]
    fn test_mixed_case_application_is_lowercased() {
        let mut config = config();
        config.application = Some("Demo".to_string());
        let graph = build(&config).unwrap();
        assert_eq!(physical_name(&graph, "resourceGroup"), "demo-rg-dev");
        assert_eq!(physical_name(&graph, "aks"), "aks-demo-dev");
        let aks = graph.get("aks").unwrap();
        assert_eq!(aks.properties["resourceName"], "aks-demo-dev");
        assert_eq!(aks.properties["dnsPrefix"], "demo-aks-dev-dns");
        let hub = graph.get("eventHub").unwrap();
        assert_eq!(hub.properties["captureDescription"]["destination"]["blobContainer"], "democontainerdev");
    }

    #[test]
    fn test_demo_event_hub() {
        let graph = build(&config()).unwrap();
        let hub = graph.get("eventHub").unwrap();
        assert_eq!(hub.properties["eventHubName"], "demo-stream-dev");
        assert_eq!(hub.properties["partitionCount"], 10);
        assert_eq!(hub.properties["messageRetentionInDays"], 7);
        assert_eq!(hub.properties["captureDescription"]["intervalInSeconds"], 120);
        assert_eq!(hub.properties["captureDescription"]["sizeLimitInBytes"], 10485763);
        assert_eq!(hub.properties["captureDescription"]["destination"]["blobContainer"], "democontainerdev");
        assert_eq!(hub.options.depends_on, vec!["storageAccount"]);
    }

    #[test]
    fn test_demo_graph_is_valid() {
        let graph = build(&config()).unwrap();
        assert!(graph.validate().is_ok(), "{:?}", graph.validate());
        let role_assignments = graph
            .resources()
            .filter(|d| d.resource_kind() == Some(ResourceKind::RoleAssignment))
            .count();
        assert_eq!(role_assignments, 6);
    }

    #[test]
    fn test_demo_role_assignments() {
        let graph = build(&config()).unwrap();
        let acr = graph.get("acrRoleAssignment").unwrap();
        assert_eq!(acr.properties["principalId"], "${kubeletIdentity.principalId}");
        assert_eq!(acr.properties["scope"], "${containerRegistry.id}");
        let network = graph.get("networkContributorRoleAssignment").unwrap();
        assert_eq!(network.properties["principalId"], "${aks.identity.principalId}");
        let reader = graph.get("privateDnsReaderRoleAssignment").unwrap();
        assert_eq!(reader.properties["scope"], "${existingResourceGroup.id}");
        let dns = graph.get("privateDnsContributorRoleAssignment").unwrap();
        assert_eq!(dns.properties["scope"], "${existingPrivateDns.id}");
        let receiver = graph.get("eventHubReceiverRoleAssignment").unwrap();
        assert_eq!(receiver.properties["scope"], "${eventHubNamespace.id}");
    }

    #[test]
    fn test_demo_subnet_lives_in_existing_group() {
        let graph = build(&config()).unwrap();
        let subnet = graph.get("subnet").unwrap();
        assert_eq!(subnet.properties["resourceGroupName"], "${existingResourceGroup.name}");
        assert_eq!(subnet.properties["virtualNetworkName"], "shared-vnet");
        assert_eq!(subnet.properties["addressPrefix"], "10.40.1.0/24");
    }

    #[test]
    fn test_deferred_kubelet_lookup_selects_segments() {
        let graph = build(&config()).unwrap();
        let lookup = graph.get("kubeletIdentity").unwrap();
        assert_eq!(lookup.properties["resourceGroupName"]["fn::select"][0], 4);
        assert_eq!(lookup.properties["resourceName"]["fn::select"][0], 8);
        assert_eq!(
            lookup.properties["resourceName"]["fn::select"][1]["fn::split"][1],
            "${aks.identityProfile[\"kubeletidentity\"].resourceId}"
        );
        assert_eq!(lookup.references(), vec!["aks"]);
    }

    #[test]
    fn test_known_kubelet_identity_is_parsed() {
        let mut config = config();
        config.kubelet_identity_resource_id = Some(KUBELET_ID.to_string());
        let graph = build(&config).unwrap();
        let lookup = graph.get("kubeletIdentity").unwrap();
        assert_eq!(lookup.properties["resourceGroupName"], "MC_demo-rg-dev_aks-demo-dev_WestEurope");
        assert_eq!(lookup.properties["resourceName"], "aks-demo-dev-agentpool");
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_malformed_kubelet_identity_fails() {
        let mut config = config();
        config.kubelet_identity_resource_id = Some("/subscriptions/s/resourceGroups/rg".to_string());
        let err = build(&config).unwrap_err();
        assert!(matches!(err, Error::ResourceId(_)));
    }

    #[test]
    fn test_demo_requires_config() {
        let err = build(&StackConfig::new("dev")).unwrap_err();
        assert_eq!(err.to_string(), "configuration error: missing required config key 'application'");
    }

    #[test]
    fn test_rendered_demo_program_validates() {
        let graph = build(&config()).unwrap();
        let yaml = program::render(&graph, "demo", None).unwrap();
        let parsed = program::validate_program(&yaml).unwrap();
        assert_eq!(parsed.len(), graph.len());
        assert!(yaml.contains("demo-stream-dev"));
        assert!(yaml.contains("7f951dda-4ed3-4680-a7ca-43fe172d538d"));
    }
}
