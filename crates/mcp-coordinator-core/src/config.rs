use crate::error::CoordinatorError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Launch configuration for a single downstream MCP server
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into, strip_option))]
pub struct ServerConfig {
    /// Human-readable text shown by `list_mcps`
    #[serde(default)]
    #[builder(default)]
    pub description: String,

    /// Executable path or name, resolved through `PATH`
    pub command: String,

    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,

    /// Environment template; values may contain `${NAME}` placeholders
    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,

    /// Working directory for the child, inherited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub cwd: Option<PathBuf>,

    /// Fail the spawn instead of substituting `""` for unset placeholders
    #[serde(default)]
    #[builder(default)]
    pub strict_env: bool,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl ServerConfigBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

/// Name and description of a configured server, as reported by `list_mcps`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSummary {
    pub name: String,
    pub description: String,
}

/// The static set of known servers, keyed by server name
///
/// Loaded once at startup and never mutated afterwards. Any read, parse or
/// validation failure is fatal: the coordinator must not start with a
/// partial manifest.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub servers: BTreeMap<String, ServerConfig>,
}

impl Manifest {
    /// Read and validate a manifest document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self, CoordinatorError> {
        let manifest: Manifest = serde_json::from_str(text)
            .map_err(|e| CoordinatorError::ConfigError(format!("malformed manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        for (name, config) in &self.servers {
            if name.trim().is_empty() {
                return Err(CoordinatorError::ConfigError(
                    "server names must not be empty".to_string(),
                ));
            }
            if config.command.trim().is_empty() {
                return Err(CoordinatorError::ConfigError(format!(
                    "server \"{name}\" has an empty command"
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, server_name: &str) -> Option<&ServerConfig> {
        self.servers.get(server_name)
    }

    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn summaries(&self) -> Vec<ServerSummary> {
        self.servers
            .iter()
            .map(|(name, config)| ServerSummary {
                name: name.clone(),
                description: config.description.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl FromIterator<(String, ServerConfig)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, ServerConfig)>>(iter: I) -> Self {
        Self {
            servers: iter.into_iter().collect(),
        }
    }
}

pub const DEFAULT_CLIENT_NAME: &str = "mcp-coordinator-client";
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Runtime knobs shared by every session
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct CoordinatorSettings {
    /// Client name announced during the handshake
    #[builder(default = "DEFAULT_CLIENT_NAME.to_string()")]
    pub client_name: String,

    #[builder(default = "env!(\"CARGO_PKG_VERSION\").to_string()")]
    pub client_version: String,

    /// Upper bound on spawn-to-initialized
    #[builder(default = "DEFAULT_HANDSHAKE_TIMEOUT")]
    pub handshake_timeout: Duration,

    /// Upper bound on a single `tools/list` or `tools/call` round-trip
    #[builder(default = "DEFAULT_CALL_TIMEOUT")]
    pub call_timeout: Duration,

    /// Time between SIGTERM and SIGKILL when terminating a child
    #[builder(default = "DEFAULT_TERMINATION_GRACE")]
    pub termination_grace: Duration,
}

impl CoordinatorSettings {
    pub fn builder() -> CoordinatorSettingsBuilder {
        CoordinatorSettingsBuilder::default()
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}
