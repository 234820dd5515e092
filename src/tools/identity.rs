// Name derivation and kubelet identity extraction.

use crate::error::{Error, Result};
use crate::naming::derive_name;
use crate::resource_id::{kubelet_identity, KubeletIdentity};
use crate::types::ResourceKind;
use serde_json::Value;

pub fn derive_resource_name(
    kind: &str,
    stage: &str,
    application: &str,
    no_separator: bool,
) -> Result<String> {
    let kind = ResourceKind::parse(kind).ok_or_else(|| {
        Error::InvalidInput(format!(
            "kind must be one of: {}",
            ResourceKind::ALL.map(ResourceKind::name).join(", ")
        ))
    })?;
    Ok(derive_name(kind, stage, application, no_separator)?)
}

/// Accepts a cluster `identityProfile` JSON object or a bare identity resource id.
pub fn parse_kubelet_identity(input: &str) -> Result<String> {
    let input = input.trim();
    let identity = if input.starts_with('{') {
        let profile: Value = serde_json::from_str(input)?;
        kubelet_identity(&profile)?
    } else {
        KubeletIdentity::from_resource_id(input)?
    };
    tracing::debug!(resource_group = %identity.resource_group, name = %identity.name, "parsed kubelet identity");
    Ok(serde_json::to_string_pretty(&identity)?)
}
