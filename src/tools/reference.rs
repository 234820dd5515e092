// Reference data: built-in roles and resource kinds with their naming rules.

use crate::error::Result;
use crate::roles::BuiltinRole;
use crate::scenarios::CLIENT_CONFIG;
use crate::types::{reference_str, LookupFunction, ResourceKind};
use serde_json::{json, Value};

/// Lists built-in roles with their definition ids. Without a subscription the
/// ids use the engine's client-config interpolation.
pub fn list_role_definitions_json(subscription_id: Option<&str>) -> Result<String> {
    let subscription = subscription_id
        .map(str::to_string)
        .unwrap_or_else(|| reference_str(CLIENT_CONFIG, "subscriptionId"));
    let roles: Vec<Value> = BuiltinRole::ALL
        .iter()
        .map(|role| {
            json!({
                "key": role.key(),
                "displayName": role.display_name(),
                "guid": role.guid(),
                "roleDefinitionId": role.definition_id(&subscription),
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&roles)?)
}

pub fn list_resource_kinds_json() -> Result<String> {
    let resources: Vec<Value> = ResourceKind::ALL
        .iter()
        .map(|kind| {
            let rule = kind.name_rule();
            json!({
                "kind": kind.name(),
                "type": kind.token(),
                "abbreviation": kind.abbreviation(),
                "nameRule": {
                    "minLength": rule.min_len,
                    "maxLength": rule.max_len,
                    "noSeparator": rule.compact,
                    "startsWithLetter": rule.starts_with_letter,
                },
            })
        })
        .collect();
    let lookups: Vec<&str> = LookupFunction::ALL.iter().map(|f| f.token()).collect();
    Ok(serde_json::to_string_pretty(&json!({
        "resources": resources,
        "lookups": lookups,
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_role_definitions_with_subscription() {
        let out = list_role_definitions_json(Some("0000")).unwrap();
        let roles: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(roles.len(), 6);
        assert_eq!(roles[0]["key"], "acr_pull");
        assert_eq!(
            roles[0]["roleDefinitionId"],
            "/subscriptions/0000/providers/Microsoft.Authorization/roleDefinitions/7f951dda-4ed3-4680-a7ca-43fe172d538d"
        );
    }

    #[test]
    fn test_list_role_definitions_default_subscription() {
        let out = list_role_definitions_json(None).unwrap();
        assert!(out.contains("${clientConfig.subscriptionId}"));
    }

    #[test]
    fn test_list_resource_kinds() {
        let out = list_resource_kinds_json().unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        let registry = v["resources"]
            .as_array()
            .unwrap()
            .iter()
            .find(|k| k["kind"] == "container_registry")
            .unwrap();
        assert_eq!(registry["nameRule"]["noSeparator"], true);
        assert_eq!(registry["type"], "azure-native:containerregistry:Registry");
        assert_eq!(v["lookups"].as_array().unwrap().len(), 4);
    }
}
