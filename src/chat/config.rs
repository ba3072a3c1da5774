//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, the resolved [`ChatConfig`], and the
//! YAML [`Catalog`] of models and projects that new sessions are seeded from.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::session::{ModelCatalog, ProjectCatalog};
use crate::types::Model;

/// Default bound on one streamed reply.
const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable consulted for models without an API key.
pub const API_KEY_ENV: &str = "FILECHAT_API_KEY";

/// Command-line arguments for the filechat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// YAML file listing models and projects.
    #[arrrg(optional, "Catalog of models and projects (YAML)", "FILE")]
    pub config: Option<String>,

    /// Directory that discovered file paths are resolved against.
    #[arrrg(optional, "Project root for file discovery (default: .)", "DIR")]
    pub root: Option<String>,

    /// Per-reply timeout in seconds; zero disables it.
    #[arrrg(optional, "Seconds before a streaming reply is abandoned (default: 300)", "SECS")]
    pub timeout: Option<u64>,

    /// Chat directly instead of answering from discovered files.
    #[arrrg(flag, "Disable file discovery")]
    pub no_discovery: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved settings for a chat run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Bound on one streamed reply; `None` waits forever.
    pub stream_timeout: Option<Duration>,

    /// Bound on connecting to the model endpoint.
    pub connect_timeout: Duration,

    /// Whether questions go through file discovery.
    pub discovery: bool,

    /// Whether requests are augmented with semantic-search results.
    pub semantic_search: bool,

    /// Directory that discovered file paths are resolved against.
    pub project_root: PathBuf,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Where the model/project catalog was read from.
    pub catalog_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Stream timeout: 300 seconds
    /// - Connect timeout: 30 seconds
    /// - Discovery: enabled
    /// - Semantic search: disabled
    /// - Project root: the working directory
    pub fn new() -> Self {
        Self {
            stream_timeout: Some(DEFAULT_STREAM_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery: true,
            semantic_search: false,
            project_root: PathBuf::from("."),
            use_color: true,
            catalog_path: None,
        }
    }

    /// Sets the per-reply timeout.
    pub fn with_stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether questions go through file discovery.
    pub fn with_discovery(mut self, enabled: bool) -> Self {
        self.discovery = enabled;
        self
    }

    /// Sets whether requests are augmented with semantic-search results.
    pub fn with_semantic_search(mut self, enabled: bool) -> Self {
        self.semantic_search = enabled;
        self
    }

    /// Sets the project root.
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the catalog path.
    pub fn with_catalog_path(mut self, path: Option<PathBuf>) -> Self {
        self.catalog_path = path;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let stream_timeout = match args.timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_STREAM_TIMEOUT),
        };
        ChatConfig {
            stream_timeout,
            discovery: !args.no_discovery,
            project_root: args.root.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            use_color: !args.no_color,
            catalog_path: args.config.map(PathBuf::from),
            ..ChatConfig::new()
        }
    }
}

/// The models and projects available to new sessions.
///
/// ```yaml
/// models:
///   - baseUrl: https://api.openai.com
///     model: gpt-4o-mini
///     temperature: 0.2
/// projects:
///   - name: filechat
///     files: [src/lib.rs, src/orchestrator.rs]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Model endpoints; new sessions use the first.
    #[serde(default)]
    pub models: Vec<Model>,

    /// Opaque project descriptions shown to the model.
    #[serde(default)]
    pub projects: Vec<Value>,
}

impl Catalog {
    /// Parse a catalog from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read a catalog from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::io(format!("cannot read catalog {}", path.display()), err)
        })?;
        Self::from_yaml(&text)
    }

    /// Give every model without an API key the value of [`API_KEY_ENV`], if it is set.
    pub fn with_env_api_key(self) -> Self {
        match env::var(API_KEY_ENV) {
            Ok(key) => self.with_default_api_key(&key),
            Err(_) => self,
        }
    }

    /// Give every model without an API key `key`.
    pub fn with_default_api_key(mut self, key: &str) -> Self {
        for model in &mut self.models {
            if model.api_key.is_empty() {
                model.api_key = key.to_string();
            }
        }
        self
    }
}

impl ModelCatalog for Catalog {
    fn models(&self) -> Vec<Model> {
        self.models.clone()
    }
}

impl ProjectCatalog for Catalog {
    fn projects(&self) -> Vec<Value> {
        self.projects.clone()
    }
}
