// Resource-name derivation: `{application}-{abbreviation}-{stage}`, or the
// parts concatenated for kinds that cannot carry separators.

use crate::types::{NameRule, ResourceKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("{part} must not be empty")]
    EmptyPart { part: &'static str },

    #[error("{part} '{value}' contains invalid character '{ch}' (allowed: a-z, 0-9, '-', '_')")]
    InvalidCharacter {
        part: &'static str,
        value: String,
        ch: char,
    },

    #[error("derived {kind} name '{name}' is {len} characters, allowed {min}..={max}")]
    Length {
        kind: &'static str,
        name: String,
        len: usize,
        min: usize,
        max: usize,
    },

    #[error("derived {kind} name '{name}' must start with a letter")]
    MustStartWithLetter { kind: &'static str, name: String },
}

/// Blob containers take lowercase alphanumerics; the capture container is
/// always compact.
const BLOB_CONTAINER_RULE: NameRule = NameRule {
    min_len: 3,
    max_len: 63,
    compact: true,
    starts_with_letter: false,
};

/// Derives the physical name of a resource.
///
/// `no_separator` requests the compact form; kinds whose name rule is
/// compact (registries, storage accounts) always get it. Inputs are
/// lowercased. `-` and `_` are word separators: the compact form removes
/// them, the separated form writes them as `-`. Any other character outside
/// `a-z0-9` is an error. The result is checked against the kind's length
/// bounds.
pub fn derive_name(
    kind: ResourceKind,
    stage: &str,
    application: &str,
    no_separator: bool,
) -> Result<String, NamingError> {
    let rule = kind.name_rule();
    let compact = no_separator || rule.compact;

    let application = normalize_part("application", application, compact)?;
    let stage = normalize_part("stage", stage, compact)?;
    let abbreviation = normalize_part("abbreviation", kind.abbreviation(), compact)?;

    let name = if compact {
        format!("{}{}{}", application, abbreviation, stage)
    } else {
        format!("{}-{}-{}", application, abbreviation, stage)
    };

    check_rule(kind.name(), name, rule)
}

/// Managed cluster name in its prefixed form, `aks-{application}-{stage}`.
pub fn cluster_name(stage: &str, application: &str) -> Result<String, NamingError> {
    let kind = ResourceKind::ManagedCluster;
    let application = normalize_part("application", application, false)?;
    let stage = normalize_part("stage", stage, false)?;
    let name = format!("{}-{}-{}", kind.abbreviation(), application, stage);
    check_rule(kind.name(), name, kind.name_rule())
}

/// Container receiving event hub capture output, `{application}container{stage}`.
pub fn blob_container_name(stage: &str, application: &str) -> Result<String, NamingError> {
    let application = normalize_part("application", application, true)?;
    let stage = normalize_part("stage", stage, true)?;
    let name = format!("{}container{}", application, stage);
    check_rule("blob_container", name, BLOB_CONTAINER_RULE)
}

fn check_rule(kind: &'static str, name: String, rule: NameRule) -> Result<String, NamingError> {
    let len = name.chars().count();
    if len < rule.min_len || len > rule.max_len {
        return Err(NamingError::Length {
            kind,
            name,
            len,
            min: rule.min_len,
            max: rule.max_len,
        });
    }
    if rule.starts_with_letter && !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(NamingError::MustStartWithLetter { kind, name });
    }
    Ok(name)
}

fn normalize_part(part: &'static str, value: &str, compact: bool) -> Result<String, NamingError> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return Err(NamingError::EmptyPart { part });
    }
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            'a'..='z' | '0'..='9' => out.push(ch),
            '-' | '_' if compact => {}
            '-' | '_' => out.push('-'),
            _ => {
                return Err(NamingError::InvalidCharacter {
                    part,
                    value: value.clone(),
                    ch,
                })
            }
        }
    }
    if out.is_empty() {
        return Err(NamingError::EmptyPart { part });
    }
    Ok(out)
}
