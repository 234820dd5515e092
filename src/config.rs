// Stack configuration: the values a Pulumi stack file supplies to the
// deployment definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_LOCATION: &str = "WestEurope";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config key '{0}'")]
    Missing(&'static str),

    #[error("config key '{key}' must be a scalar value")]
    NotScalar { key: String },

    #[error("stack config must be a mapping")]
    NotAMapping,

    #[error("cannot read stack file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid stack file: {0}")]
    Parse(String),
}

/// Values a deployment definition reads from the stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub stage: String,
    pub deployer: Option<String>,
    pub email: Option<String>,
    pub application: Option<String>,
    pub location: Option<String>,
    pub private_dns_zone: Option<String>,
    pub external_resource_group: Option<String>,
    pub subnet_cidr: Option<String>,
    pub external_vnet: Option<String>,
    /// Resource id of the cluster's kubelet identity, once the cluster exists.
    pub kubelet_identity_resource_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StackFile {
    #[serde(default)]
    config: BTreeMap<String, serde_yaml::Value>,
}

impl StackConfig {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Default::default()
        }
    }

    /// Reads `Pulumi.<stage>.yaml`; the stage is taken from the file name.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let stage = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("Pulumi."))
            .and_then(|n| n.strip_suffix(".yaml").or_else(|| n.strip_suffix(".yml")))
            .ok_or_else(|| ConfigError::Parse(format!("{} is not a Pulumi.<stage>.yaml file", path.display())))?;
        Self::from_stack_yaml(stage, &contents)
    }

    /// Parses the contents of a stack file. Keys may carry a `project:` namespace.
    pub fn from_stack_yaml(stage: &str, yaml: &str) -> Result<Self, ConfigError> {
        let file: StackFile =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::new(stage);
        for (key, value) in file.config {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => continue,
                // `secure:` values and other structured entries are not read here.
                serde_yaml::Value::Mapping(_) => continue,
                _ => return Err(ConfigError::NotScalar { key }),
            };
            config.set(&key, value);
        }
        Ok(config)
    }

    /// Parses a flat JSON object of config keys.
    pub fn from_json(stage: &str, json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let map = value.as_object().ok_or(ConfigError::NotAMapping)?;
        let mut config = Self::new(stage);
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                _ => return Err(ConfigError::NotScalar { key: key.clone() }),
            };
            config.set(key, value);
        }
        Ok(config)
    }

    fn set(&mut self, key: &str, value: String) {
        let key = key.rsplit(':').next().unwrap_or(key);
        let slot = match key {
            "stage" => {
                self.stage = value;
                return;
            }
            "deployer" => &mut self.deployer,
            "email" => &mut self.email,
            "application" => &mut self.application,
            "location" => &mut self.location,
            "private_dns_zone" | "privateDnsZone" => &mut self.private_dns_zone,
            "external_resource_group" | "tomtom_rg" => &mut self.external_resource_group,
            "subnet_cidr" | "subnetCidr" => &mut self.subnet_cidr,
            "external_vnet" | "tomtom_vnet" => &mut self.external_vnet,
            "kubelet_identity_resource_id" | "kubeletIdentityResourceId" => {
                &mut self.kubelet_identity_resource_id
            }
            other => {
                tracing::debug!(key = other, "ignoring unknown config key");
                return;
            }
        };
        *slot = Some(value);
    }

    pub fn location(&self) -> &str {
        self.location.as_deref().unwrap_or(DEFAULT_LOCATION)
    }

    pub fn require_application(&self) -> Result<&str, ConfigError> {
        require(&self.application, "application")
    }

    pub fn require_private_dns_zone(&self) -> Result<&str, ConfigError> {
        require(&self.private_dns_zone, "private_dns_zone")
    }

    pub fn require_external_resource_group(&self) -> Result<&str, ConfigError> {
        require(&self.external_resource_group, "external_resource_group")
    }

    pub fn require_subnet_cidr(&self) -> Result<&str, ConfigError> {
        require(&self.subnet_cidr, "subnet_cidr")
    }

    pub fn require_external_vnet(&self) -> Result<&str, ConfigError> {
        require(&self.external_vnet, "external_vnet")
    }

    pub fn require_stage(&self) -> Result<&str, ConfigError> {
        if self.stage.trim().is_empty() {
            Err(ConfigError::Missing("stage"))
        } else {
            Ok(&self.stage)
        }
    }
}

fn require<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stack_yaml_strips_namespaces() {
        let yaml = r#"
config:
  azure-native:location: westeurope
  demo:application: demo
  demo:deployer: ops
  demo:private_dns_zone: privatelink.westeurope.azmk8s.io
  demo:tomtom_rg: shared-network
  demo:subnet_cidr: 10.40.1.0/24
  demo:tomtom_vnet: shared-vnet
  demo:replicas: 3
  demo:password:
    secure: AAABAcFPT
"#;
        let config = StackConfig::from_stack_yaml("dev", yaml).unwrap();
        assert_eq!(config.stage, "dev");
        assert_eq!(config.location(), "westeurope");
        assert_eq!(config.require_application().unwrap(), "demo");
        assert_eq!(config.deployer.as_deref(), Some("ops"));
        assert_eq!(config.require_external_resource_group().unwrap(), "shared-network");
        assert_eq!(config.require_external_vnet().unwrap(), "shared-vnet");
        assert_eq!(config.require_subnet_cidr().unwrap(), "10.40.1.0/24");
    }

    #[test]
    fn test_empty_stack_value_is_unset() {
        let config =
            StackConfig::from_stack_yaml("dev", "config:\n  demo:application: demo\n  demo:email:\n").unwrap();
        assert_eq!(config.require_application().unwrap(), "demo");
        assert_eq!(config.email, None);
    }

    #[test]
    fn test_from_json() {
        let config = StackConfig::from_json("dev", r#"{"application":"demo","email":null,"location":"northeurope"}"#).unwrap();
        assert_eq!(config.require_application().unwrap(), "demo");
        assert_eq!(config.email, None);
        assert_eq!(config.location(), "northeurope");
    }

    #[test]
    fn test_default_location() {
        assert_eq!(StackConfig::new("dev").location(), DEFAULT_LOCATION);
    }

    #[test]
    fn test_missing_key_is_named() {
        let config = StackConfig::new("dev");
        let err = config.require_private_dns_zone().unwrap_err();
        assert_eq!(err.to_string(), "missing required config key 'private_dns_zone'");
        assert!(StackConfig::new(" ").require_stage().is_err());
    }

    #[test]
    fn test_structured_json_value_rejected() {
        let err = StackConfig::from_json("dev", r#"{"application":["a"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::NotScalar { .. }));
        assert!(matches!(StackConfig::from_json("dev", "[]").unwrap_err(), ConfigError::NotAMapping));
    }
}
