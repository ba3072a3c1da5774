use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};

const COMPLETIONS_PATH: &str = "v1/chat/completions";

/// A model endpoint: where to send completions and how to authenticate.
///
/// Everything besides the base URL and API key (`model`, `temperature`, ...) is carried verbatim
/// in `options` and merged into every request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Base URL of an OpenAI-compatible API.
    #[serde(rename = "baseUrl")]
    pub base_url: String,

    /// Bearer token for the API.
    #[serde(rename = "apiKey", default)]
    pub api_key: String,

    /// Provider options merged into the request body.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl Model {
    /// Create a new `Model` with no extra options.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            options: Map::new(),
        }
    }

    /// Set a request option such as `model` or `temperature`.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The `model` option, if one is set.
    pub fn name(&self) -> Option<&str> {
        self.options.get("model").and_then(Value::as_str)
    }

    /// The chat-completions endpoint for this model.
    ///
    /// The base URL is normalized to end in exactly one slash before the API path is appended.
    pub fn completions_url(&self) -> Result<Url> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::configuration("model has an empty base URL"));
        }
        let base = Url::parse(&format!("{trimmed}/"))?;
        Ok(base.join(COMPLETIONS_PATH)?)
    }
}
