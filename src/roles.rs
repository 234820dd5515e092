// Built-in Azure role definitions granted by the deployment definitions.
// The GUIDs are fixed by Azure and must match byte for byte.

use serde::Serialize;

const ROLE_DEFINITIONS_PATH: &str = "/providers/Microsoft.Authorization/roleDefinitions/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinRole {
    AcrPull,
    NetworkContributor,
    PrivateDnsContributor,
    GeneralReader,
    EventHubSender,
    EventHubReceiver,
}

impl BuiltinRole {
    pub const ALL: [BuiltinRole; 6] = [
        BuiltinRole::AcrPull,
        BuiltinRole::NetworkContributor,
        BuiltinRole::PrivateDnsContributor,
        BuiltinRole::GeneralReader,
        BuiltinRole::EventHubSender,
        BuiltinRole::EventHubReceiver,
    ];

    pub fn guid(self) -> &'static str {
        match self {
            BuiltinRole::AcrPull => "7f951dda-4ed3-4680-a7ca-43fe172d538d",
            BuiltinRole::NetworkContributor => "4d97b98b-1d4f-4787-a291-c67834d212e7",
            BuiltinRole::PrivateDnsContributor => "b12aa53e-6015-4669-85d0-8515ebb3ae7f",
            BuiltinRole::GeneralReader => "acdd72a7-3385-48ef-bd42-f606fba81ae7",
            BuiltinRole::EventHubSender => "2b629674-e913-4c01-ae53-ef4638d8f975",
            BuiltinRole::EventHubReceiver => "a638d3c7-ab3a-418d-83e6-5f17a39d4fde",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            BuiltinRole::AcrPull => "acr_pull",
            BuiltinRole::NetworkContributor => "network_contributor",
            BuiltinRole::PrivateDnsContributor => "private_dns_contributor",
            BuiltinRole::GeneralReader => "general_reader",
            BuiltinRole::EventHubSender => "event_hub_sender",
            BuiltinRole::EventHubReceiver => "event_hub_receiver",
        }
    }

    /// Azure display name of the role.
    pub fn display_name(self) -> &'static str {
        match self {
            BuiltinRole::AcrPull => "AcrPull",
            BuiltinRole::NetworkContributor => "Network Contributor",
            BuiltinRole::PrivateDnsContributor => "Private DNS Zone Contributor",
            BuiltinRole::GeneralReader => "Reader",
            BuiltinRole::EventHubSender => "Azure Event Hubs Data Sender",
            BuiltinRole::EventHubReceiver => "Azure Event Hubs Data Receiver",
        }
    }

    /// Full role definition id under a subscription. The subscription may be
    /// a literal id or an interpolation resolved by the engine.
    pub fn definition_id(self, subscription: &str) -> String {
        format!("/subscriptions/{}{}{}", subscription, ROLE_DEFINITIONS_PATH, self.guid())
    }

    /// Recognizes a full role definition id of a built-in role:
    /// `/subscriptions/{subscription}/providers/Microsoft.Authorization/roleDefinitions/{guid}`.
    pub fn from_definition_id(id: &str) -> Option<Self> {
        let rest = id.strip_prefix("/subscriptions/")?;
        let (subscription, guid) = rest.split_once(ROLE_DEFINITIONS_PATH)?;
        if subscription.is_empty() || subscription.contains('/') {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|r| r.guid().eq_ignore_ascii_case(guid))
    }
}
