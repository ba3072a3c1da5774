//! Optional semantic-search augmentation of an outgoing conversation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::observability::SEMANTIC_SEARCHES;
use crate::types::{Message, Role};

/// One hit from a semantic index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The indexed query the hit matched.
    #[serde(rename = "queryText")]
    pub query_text: String,

    /// The code the query maps to.
    #[serde(rename = "resultText")]
    pub result_text: String,
}

impl SearchResult {
    /// Create a new `SearchResult`.
    pub fn new(query_text: impl Into<String>, result_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            result_text: result_text.into(),
        }
    }
}

/// Query interface of a semantic index.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Look up entries related to `query`.
    async fn perform_semantic_search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Appends semantic-search results to a conversation as an extra user message.
#[derive(Clone)]
pub struct SemanticSearchAugmenter {
    search: Arc<dyn SemanticSearch>,
}

impl SemanticSearchAugmenter {
    /// Creates an augmenter over `search`.
    pub fn new(search: Arc<dyn SemanticSearch>) -> Self {
        Self { search }
    }

    /// Return `messages` with the search results for the latest question appended.
    ///
    /// Nothing is appended when there is no question or the search finds nothing.
    pub async fn augment(&self, messages: &[Message]) -> Result<Vec<Message>> {
        let mut augmented = messages.to_vec();
        let Some(query) = query_for(messages) else {
            return Ok(augmented);
        };
        SEMANTIC_SEARCHES.click();
        let results = self.search.perform_semantic_search(query).await?;
        let context = format_results(&results);
        tracing::debug!(results = results.len(), "semantic search finished");
        if !context.is_empty() {
            augmented.push(Message::user(context));
        }
        Ok(augmented)
    }
}

/// The text to search for: the last message if the user wrote it, else the one before.
pub fn query_for(messages: &[Message]) -> Option<&str> {
    let (last, rest) = messages.split_last()?;
    if last.role == Role::User {
        Some(&last.content)
    } else {
        rest.last().map(|message| message.content.as_str())
    }
}

/// Render search results as reference blocks separated by blank lines.
pub fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!(
                "### Reference\n\n**Query:** {}\n**Code:** `{}`",
                r.query_text, r.result_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedSearch {
        results: Vec<SearchResult>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SemanticSearch for FixedSearch {
        async fn perform_semantic_search(&self, query: &str) -> Result<Vec<SearchResult>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.results.clone())
        }
    }

    fn augmenter(results: Vec<SearchResult>) -> (SemanticSearchAugmenter, Arc<FixedSearch>) {
        let search = Arc::new(FixedSearch {
            results,
            queries: Mutex::new(Vec::new()),
        });
        (SemanticSearchAugmenter::new(search.clone()), search)
    }

    #[test]
    fn query_prefers_trailing_user_message() {
        let messages = vec![Message::system("ctx"), Message::user("why?")];
        assert_eq!(query_for(&messages), Some("why?"));

        let messages = vec![Message::user("why?"), Message::assistant("because")];
        assert_eq!(query_for(&messages), Some("why?"));

        assert_eq!(query_for(&[Message::assistant("alone")]), None);
        assert_eq!(query_for(&[]), None);
    }

    #[test]
    fn results_are_formatted_as_references() {
        let text = format_results(&[
            SearchResult::new("parse args", "fn parse()"),
            SearchResult::new("main", "fn main()"),
        ]);
        assert_eq!(
            text,
            "### Reference\n\n**Query:** parse args\n**Code:** `fn parse()`\n\n\
             ### Reference\n\n**Query:** main\n**Code:** `fn main()`"
        );
    }

    #[tokio::test]
    async fn augment_appends_one_user_message() {
        let (augmenter, search) = augmenter(vec![SearchResult::new("q", "r")]);
        let messages = vec![Message::system("ctx"), Message::user("question")];
        let augmented = augmenter.augment(&messages).await.unwrap();
        assert_eq!(augmented.len(), 3);
        assert_eq!(&augmented[..2], &messages[..]);
        assert_eq!(augmented[2].role, Role::User);
        assert!(augmented[2].content.contains("**Code:** `r`"));
        assert_eq!(*search.queries.lock().unwrap(), vec!["question".to_string()]);
    }

    #[tokio::test]
    async fn augment_without_results_changes_nothing() {
        let (augmenter, _) = augmenter(Vec::new());
        let messages = vec![Message::user("question")];
        assert_eq!(augmenter.augment(&messages).await.unwrap(), messages);
    }
}
