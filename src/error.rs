// Crate error type. Module errors convert into it so tool handlers can use `?`.

use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::naming::NamingError;
use crate::resource_id::ResourceIdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("resource id error: {0}")]
    ResourceId(#[from] ResourceIdError),

    #[error("invalid resource graph:\n{}", format_graph_errors(.0))]
    Graph(Vec<GraphError>),

    #[error("program error: {0}")]
    Program(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Vec<GraphError>> for Error {
    fn from(errors: Vec<GraphError>) -> Self {
        Error::Graph(errors)
    }
}

fn format_graph_errors(errors: &[GraphError]) -> String {
    errors
        .iter()
        .map(|e| format!("- {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
