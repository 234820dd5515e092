// Course scenario: dedicated network, AD application + service principal,
// registry and cluster. Physical names are fixed for this scenario.

use super::{client_config, managed_cluster, role_assignment, ssh_key, tags, ClusterSpec};
use crate::config::StackConfig;
use crate::error::Result;
use crate::graph::{Declaration, ResourceGraph};
use crate::roles::BuiltinRole;
use crate::types::{reference, ResourceKind};
use serde_json::json;

pub const PROJECT: &str = "iac-course";

pub const RESOURCE_GROUP_NAME: &str = "iac_course_project";
pub const VNET_NAME: &str = "iac_course_vn";
pub const VNET_ADDRESS_PREFIX: &str = "10.30.0.0/16";
pub const SUBNET_NAME: &str = "iac_course_sn";
pub const SUBNET_ADDRESS_PREFIX: &str = "10.30.1.0/24";
pub const AD_APPLICATION_NAME: &str = "iac_course_ad_app";
pub const REGISTRY_NAME: &str = "crashcourseacr";
pub const CLUSTER_NAME: &str = "iac_course_aks";
pub const DNS_PREFIX: &str = "iac-course-aks-dns";
pub const NODE_COUNT: u32 = 1;

pub fn build(config: &StackConfig) -> Result<ResourceGraph> {
    let stage = config.require_stage()?;
    let location = config.location();
    let tags = tags(&[
        ("stage", Some(stage)),
        ("deployer", config.deployer.as_deref()),
        ("email", config.email.as_deref()),
    ]);

    let mut graph = ResourceGraph::new();
    graph.declare(client_config());

    let rg = graph.declare(
        Declaration::resource(ResourceKind::ResourceGroup, "resourceGroup")
            .property("location", location)
            .property("resourceGroupName", RESOURCE_GROUP_NAME)
            .property("tags", tags.clone()),
    );

    let vnet = graph.declare(
        Declaration::resource(ResourceKind::VirtualNetwork, "virtualNetwork")
            .property("addressSpace", json!({ "addressPrefixes": [VNET_ADDRESS_PREFIX] }))
            .property("location", location)
            .property("resourceGroupName", reference(&rg, "name"))
            .property("virtualNetworkName", VNET_NAME)
            .property("tags", tags.clone()),
    );

    let subnet = graph.declare(
        Declaration::resource(ResourceKind::Subnet, "subnet")
            .property("addressPrefix", SUBNET_ADDRESS_PREFIX)
            .property("resourceGroupName", reference(&rg, "name"))
            .property("subnetName", SUBNET_NAME)
            .property("virtualNetworkName", reference(&vnet, "name")),
    );

    let app = graph.declare(
        Declaration::resource(ResourceKind::AdApplication, "azureAd")
            .property("displayName", AD_APPLICATION_NAME),
    );

    let sp = graph.declare(
        Declaration::resource(ResourceKind::ServicePrincipal, "servicePrincipal")
            .property("applicationId", reference(&app, "applicationId")),
    );

    let acr = graph.declare(
        Declaration::resource(ResourceKind::ContainerRegistry, "containerRegistry")
            .property("adminUserEnabled", true)
            .property("location", location)
            .property("registryName", REGISTRY_NAME)
            .property("resourceGroupName", reference(&rg, "name"))
            .property("sku", json!({ "name": "Standard" }))
            .property("tags", tags.clone()),
    );

    graph.declare(role_assignment(
        "acrPermissions",
        reference(&sp, "id"),
        BuiltinRole::AcrPull,
        reference(&acr, "id"),
    ));
    graph.declare(role_assignment(
        "subnetPermissions",
        reference(&sp, "id"),
        BuiltinRole::NetworkContributor,
        reference(&subnet, "id"),
    ));

    let key = graph.declare(ssh_key("sshKeyForLinuxAccess"));

    let aks = graph.declare(managed_cluster(ClusterSpec {
        logical_name: "azureAks",
        cluster_name: CLUSTER_NAME,
        resource_group: &rg,
        subnet: &subnet,
        ssh_key: &key,
        dns_prefix: DNS_PREFIX,
        node_count: NODE_COUNT,
        tags,
    }));

    graph.output("resourceGroupName", reference(&rg, "name"));
    graph.output("registryLoginServer", reference(&acr, "loginServer"));
    graph.output("clusterName", reference(&aks, "name"));
    Ok(graph)
}
