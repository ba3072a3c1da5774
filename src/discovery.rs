//! The two prompts of the file-discovery pipeline and the pieces between them.
//!
//! Discovery asks the model which files matter for a question and expects a fenced JSON object
//! back.  The files it names are fetched through a [`FileAccess`] collaborator and rendered as
//! code blocks for the context-answer prompt.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability::{DISCOVERY_FILE_FETCHES, DISCOVERY_MALFORMED};

const FENCE: &str = "```";

/// Build the prompt that asks the model to pick relevant files for `question`.
pub fn discovery_prompt(question: &str) -> String {
    format!(
        "You are helping answer a question about the projects described in the system message.\n\
         Decide which files must be read to answer it.\n\n\
         Question:\n{question}\n\n\
         Reply with a single JSON object inside a ```json fenced code block, and nothing else:\n\
         ```json\n\
         {{\n  \"analysis\": \"how you narrowed down the files\",\n  \
         \"reason\": [\"why the first file is relevant\"],\n  \
         \"filepath\": [\"path/of/the/first/file\"]\n}}\n\
         ```\n\
         `reason` and `filepath` are parallel lists.  If no file is relevant, return an empty \
         `filepath` list."
    )
}

/// Build the prompt that answers `question` from the fetched `context`.
pub fn context_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "Here is the content of the files relevant to the question:\n\n{context}\n\n\
         Question:\n{question}\n\n\
         Work through the answer in four parts:\n\
         1. Think: work out what the question needs and where the files answer it.\n\
         2. Reflect: check that reasoning against the code and look for gaps.\n\
         3. Re-think: correct the reasoning where the reflection found problems.\n\
         4. Answer: give the final answer.\n\n\
         Any code in the answer must state the path of the file it comes from."
    )
}

/// The structured reply to a discovery prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReply {
    /// The model's reasoning.
    #[serde(default)]
    pub analysis: String,

    /// One reason per selected file.
    #[serde(default)]
    pub reason: Vec<String>,

    /// The selected files.
    #[serde(default)]
    pub filepath: Vec<String>,
}

impl DiscoveryReply {
    /// Parse a discovery reply out of free-form model text.
    ///
    /// The first fenced block tagged `json` (or untagged) is parsed.  A reply without such a block,
    /// or whose block is not a `{analysis, reason[], filepath[]}` object, is
    /// [`Error::MalformedModelOutput`].
    pub fn parse(text: &str) -> Result<Self> {
        let Some(block) = extract_fenced_json(text) else {
            DISCOVERY_MALFORMED.click();
            return Err(Error::malformed_model_output(
                "discovery reply has no fenced JSON block",
                text,
            ));
        };
        serde_json::from_str(block).map_err(|err| {
            DISCOVERY_MALFORMED.click();
            Error::malformed_model_output(
                format!("discovery reply does not match {{analysis, reason[], filepath[]}}: {err}"),
                text,
            )
        })
    }

    /// The selected paths, trimmed, without blanks or duplicates.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for path in &self.filepath {
            let path = path.trim();
            if !path.is_empty() && !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        }
        paths
    }
}

/// Find the body of the first fenced code block that is tagged `json` or untagged.
pub fn extract_fenced_json(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        let line_end = after.find('\n').unwrap_or(after.len());
        let line = &after[..line_end];

        // ```{"filepath": []}```
        if let Some(close) = line.find(FENCE) {
            let inner = line[..close].trim();
            let inner = inner.strip_prefix("json").map_or(inner, str::trim_start);
            if inner.starts_with('{') {
                return Some(inner);
            }
            rest = &after[close + FENCE.len()..];
            continue;
        }

        let tag = line.trim();
        let body = &after[(line_end + 1).min(after.len())..];
        let (inner, next) = match body.find(FENCE) {
            Some(close) => (&body[..close], &body[close + FENCE.len()..]),
            None => (body, ""),
        };
        if tag.is_empty() || tag.eq_ignore_ascii_case("json") {
            return Some(inner.trim());
        }
        rest = next;
    }
    None
}

/// The content of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// The file's text.
    pub content: String,
}

/// Source of project files.
#[async_trait]
pub trait FileAccess: Send + Sync {
    /// Fetch the file at `path`.
    async fn get_one_file(&self, path: &str) -> Result<FileContent>;
}

/// Reads files relative to a root directory.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    root: PathBuf,
}

impl LocalFiles {
    /// Serve files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(Error::file_access(path, "path is outside the project root"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileAccess for LocalFiles {
    async fn get_one_file(&self, path: &str) -> Result<FileContent> {
        let full = self.resolve(path)?;
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|err| Error::file_access(path, err.to_string()))?;
        Ok(FileContent { content })
    }
}

/// Render one file as a labelled code block tagged with its extension.
pub fn format_file_block(path: &str, content: &str) -> String {
    let ext = path.rsplit('.').next().unwrap_or(path);
    format!("{path}:\n```{ext}\n{content}\n```")
}

/// Fetch every path concurrently and concatenate the rendered blocks in path order.
///
/// Files with blank content are left out, so the result is empty when nothing useful was found.
pub async fn fetch_context(files: &dyn FileAccess, paths: &[String]) -> Result<String> {
    DISCOVERY_FILE_FETCHES.count(paths.len() as u64);
    let blocks = try_join_all(paths.iter().map(|path| async move {
        let file = files.get_one_file(path).await?;
        if file.content.trim().is_empty() {
            tracing::debug!(path = %path, "skipping empty file");
            Ok::<_, Error>(String::new())
        } else {
            Ok(format_file_block(path, &file.content))
        }
    }))
    .await?;
    Ok(blocks.concat())
}
