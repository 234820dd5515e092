//! Azure resource-id parsing.
//!
//! Resource ids follow
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`
//! with optional trailing `/{childType}/{childName}` pairs. The parser checks
//! every fixed keyword instead of indexing into a split string, so a
//! malformed id fails with the reason rather than yielding the wrong segment.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Key the managed cluster uses for its kubelet identity in `identityProfile`.
pub const KUBELET_IDENTITY_KEY: &str = "kubeletidentity";
pub const MANAGED_IDENTITY_NAMESPACE: &str = "Microsoft.ManagedIdentity";
pub const USER_ASSIGNED_IDENTITY_TYPE: &str = "userAssignedIdentities";

/// Segment positions of a user-assigned identity id after splitting on `/`
/// (the leading empty segment counts as 0).
pub const RESOURCE_GROUP_SEGMENT: usize = 4;
pub const IDENTITY_NAME_SEGMENT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceIdError {
    #[error("resource id must start with '/': '{0}'")]
    NotAbsolute(String),

    #[error("resource id '{id}' has an empty segment at position {position}")]
    EmptySegment { id: String, position: usize },

    #[error("resource id '{id}': expected '{expected}' at position {position}, found '{found}'")]
    UnexpectedSegment {
        id: String,
        position: usize,
        expected: &'static str,
        found: String,
    },

    #[error("resource id '{id}' ends before '{expected}'")]
    Truncated { id: String, expected: &'static str },

    #[error("resource id '{id}' has a resource type without a name")]
    UnpairedType { id: String },

    #[error("identity profile has no 'kubeletidentity' entry")]
    MissingKubeletIdentity,

    #[error("kubelet identity entry has no resource id")]
    MissingResourceId,

    #[error("resource id '{id}' is not a user-assigned identity (found {namespace}/{resource_type})")]
    NotUserAssignedIdentity {
        id: String,
        namespace: String,
        resource_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceType {
    pub type_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider_namespace: String,
    /// Top-level type first, then child types in order.
    pub types: Vec<ResourceType>,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self, ResourceIdError> {
        let rest = id
            .strip_prefix('/')
            .ok_or_else(|| ResourceIdError::NotAbsolute(id.to_string()))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let segments: Vec<&str> = rest.split('/').collect();
        if let Some(position) = segments.iter().position(|s| s.is_empty()) {
            return Err(ResourceIdError::EmptySegment {
                id: id.to_string(),
                position: position + 1,
            });
        }

        let mut cursor = Cursor { id, segments: &segments, position: 0 };
        cursor.keyword("subscriptions")?;
        let subscription_id = cursor.value("subscription id")?;
        cursor.keyword("resourceGroups")?;
        let resource_group = cursor.value("resource group name")?;
        cursor.keyword("providers")?;
        let provider_namespace = cursor.value("provider namespace")?;

        let mut types = Vec::new();
        while let Some(type_name) = cursor.next() {
            let name = cursor.next().ok_or_else(|| ResourceIdError::UnpairedType {
                id: id.to_string(),
            })?;
            types.push(ResourceType {
                type_name: type_name.to_string(),
                name: name.to_string(),
            });
        }
        if types.is_empty() {
            return Err(ResourceIdError::Truncated {
                id: id.to_string(),
                expected: "resource type",
            });
        }

        Ok(Self {
            subscription_id,
            resource_group,
            provider_namespace,
            types,
        })
    }

    /// Name of the innermost resource.
    pub fn name(&self) -> &str {
        self.types.last().map(|t| t.name.as_str()).unwrap_or_default()
    }

    pub fn resource_type(&self) -> &str {
        self.types.last().map(|t| t.type_name.as_str()).unwrap_or_default()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.subscription_id, self.resource_group, self.provider_namespace
        )?;
        for t in &self.types {
            write!(f, "/{}/{}", t.type_name, t.name)?;
        }
        Ok(())
    }
}

struct Cursor<'a> {
    id: &'a str,
    segments: &'a [&'a str],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let segment = self.segments.get(self.position).copied();
        if segment.is_some() {
            self.position += 1;
        }
        segment
    }

    fn keyword(&mut self, expected: &'static str) -> Result<(), ResourceIdError> {
        let position = self.position + 1;
        match self.next() {
            Some(found) if found.eq_ignore_ascii_case(expected) => Ok(()),
            Some(found) => Err(ResourceIdError::UnexpectedSegment {
                id: self.id.to_string(),
                position,
                expected,
                found: found.to_string(),
            }),
            None => Err(ResourceIdError::Truncated {
                id: self.id.to_string(),
                expected,
            }),
        }
    }

    fn value(&mut self, expected: &'static str) -> Result<String, ResourceIdError> {
        self.next()
            .map(str::to_string)
            .ok_or_else(|| ResourceIdError::Truncated {
                id: self.id.to_string(),
                expected,
            })
    }
}

/// Resource group and name of a cluster's kubelet identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KubeletIdentity {
    pub resource_group: String,
    pub name: String,
    pub resource_id: String,
}

impl KubeletIdentity {
    /// Parses a user-assigned identity resource id.
    pub fn from_resource_id(id: &str) -> Result<Self, ResourceIdError> {
        let parsed = ResourceId::parse(id)?;
        if !parsed
            .provider_namespace
            .eq_ignore_ascii_case(MANAGED_IDENTITY_NAMESPACE)
            || parsed.types.len() != 1
            || !parsed
                .resource_type()
                .eq_ignore_ascii_case(USER_ASSIGNED_IDENTITY_TYPE)
        {
            return Err(ResourceIdError::NotUserAssignedIdentity {
                id: id.to_string(),
                namespace: parsed.provider_namespace.clone(),
                resource_type: parsed
                    .types
                    .iter()
                    .map(|t| t.type_name.as_str())
                    .collect::<Vec<_>>()
                    .join("/"),
            });
        }
        Ok(Self {
            name: parsed.name().to_string(),
            resource_group: parsed.resource_group,
            resource_id: id.to_string(),
        })
    }
}

/// Extracts the kubelet identity from a managed cluster's `identityProfile`.
///
/// Accepts either `resourceId` (API shape) or `resource_id` (SDK shape).
pub fn kubelet_identity(identity_profile: &Value) -> Result<KubeletIdentity, ResourceIdError> {
    let entry = identity_profile
        .get(KUBELET_IDENTITY_KEY)
        .ok_or(ResourceIdError::MissingKubeletIdentity)?;
    let id = entry
        .get("resourceId")
        .or_else(|| entry.get("resource_id"))
        .and_then(Value::as_str)
        .ok_or(ResourceIdError::MissingResourceId)?;
    KubeletIdentity::from_resource_id(id)
}
