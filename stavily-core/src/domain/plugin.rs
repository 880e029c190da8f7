//! Plugin domain types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime a plugin entrypoint is launched under.
///
/// Extending to a new runtime means adding a variant here and a matching
/// launch function in `stavily-agent::executor::runtime`; no other
/// dispatch point needs to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Python,
    Node,
    Bash,
    Docker,
    Native,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeKind::Python => "python",
            RuntimeKind::Node => "node",
            RuntimeKind::Bash => "bash",
            RuntimeKind::Docker => "docker",
            RuntimeKind::Native => "native",
        };
        write!(f, "{s}")
    }
}

/// A plugin materialized on disk under the plugin store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPlugin {
    pub plugin_id: String,
    pub root: PathBuf,
    pub entrypoint: String,
    pub runtime: RuntimeKind,
}

impl InstalledPlugin {
    pub fn entrypoint_path(&self) -> PathBuf {
        self.root.join(&self.entrypoint)
    }
}
