//! End-to-end tests of the chat orchestrator against an in-process completion endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use filechat::{
    ByteStream, ChatCompletionRequest, ChatOrchestrator, ChatStore, CompletionTransport,
    DiscoveryOutcome, Error, FileAccess, FileContent, Message, Model, ProgressObserver, Result,
    SearchResult, SemanticSearch, SemanticSearchAugmenter, SessionManager, StopOutcome,
    StreamEnd,
};

/// One scripted response: chunks delivered in order, optionally followed by a stall.
struct Script {
    chunks: Vec<String>,
    stall: bool,
}

#[derive(Default)]
struct FakeEndpoint {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl FakeEndpoint {
    fn respond(self, chunks: &[&str]) -> Self {
        self.push(chunks, false)
    }

    fn respond_then_stall(self, chunks: &[&str]) -> Self {
        self.push(chunks, true)
    }

    fn push(self, chunks: &[&str], stall: bool) -> Self {
        self.scripts.lock().unwrap().push_back(Script {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            stall,
        });
        self
    }

    fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionTransport for FakeEndpoint {
    async fn open_stream(&self, _: &Model, request: &ChatCompletionRequest) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::status(503, None, "no scripted response", None))?;
        let chunks: Vec<Result<Bytes>> = script
            .chunks
            .into_iter()
            .map(|chunk| Ok(Bytes::from(chunk)))
            .collect();
        let body = stream::iter(chunks);
        if script.stall {
            Ok(Box::pin(body.chain(stream::pending())))
        } else {
            Ok(Box::pin(body))
        }
    }
}

#[derive(Default)]
struct FakeFiles {
    fetches: AtomicUsize,
    blank: bool,
}

impl FakeFiles {
    fn blank() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            blank: true,
        }
    }
}

#[async_trait]
impl FileAccess for FakeFiles {
    async fn get_one_file(&self, path: &str) -> Result<FileContent> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.blank {
            return Ok(FileContent {
                content: " \n".to_string(),
            });
        }
        Ok(FileContent {
            content: format!("fn {}() {{}}", path.replace(['/', '.'], "_")),
        })
    }
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Option<usize>>>,
}

impl ProgressObserver for Recorder {
    fn message_updated(&self, index: Option<usize>) {
        self.calls.lock().unwrap().push(index);
    }
}

fn delta(text: &str) -> String {
    format!("data: {}\n\n", json!({"choices": [{"delta": {"content": text}}]}))
}

struct Harness {
    orchestrator: Arc<ChatOrchestrator>,
    endpoint: Arc<FakeEndpoint>,
    files: Arc<FakeFiles>,
}

impl Harness {
    fn new(endpoint: FakeEndpoint) -> Self {
        Self::with_files(endpoint, FakeFiles::default())
    }

    fn with_files(endpoint: FakeEndpoint, files: FakeFiles) -> Self {
        let models = vec![Model::new("https://llm.example.com/", "sk-test").with_option("model", "m")];
        let projects = vec![json!({"name": "demo"})];
        let store = ChatStore::new(SessionManager::new(Arc::new(models), Arc::new(projects)));
        store.lock().sessions.create_session().unwrap();
        let endpoint = Arc::new(endpoint);
        let files = Arc::new(files);
        let orchestrator = Arc::new(ChatOrchestrator::new(
            endpoint.clone(),
            store,
            files.clone(),
        ));
        Self {
            orchestrator,
            endpoint,
            files,
        }
    }

    fn messages(&self) -> Vec<Message> {
        self.orchestrator
            .store()
            .lock()
            .sessions
            .current()
            .unwrap()
            .messages
            .clone()
    }
}

#[tokio::test]
async fn hello_scenario() {
    let harness = Harness::new(FakeEndpoint::default().respond(&[
        r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
        "data: [DONE]",
    ]));
    let recorder = Arc::new(Recorder::default());
    let outcome = harness
        .orchestrator
        .ask("greet me", false, false, recorder.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, DiscoveryOutcome::Answered(turn) if turn.index == 2));

    let messages = harness.messages();
    assert_eq!(messages[2].content, "Hello");
    assert!(!messages[2].is_analyzing);
    assert!(!harness.orchestrator.controller().is_streaming());
    assert_eq!(*recorder.calls.lock().unwrap(), vec![Some(2); 3]);

    let stored = harness.orchestrator.store().lock().sessions.sessions()[0].clone();
    assert_eq!(stored.messages, messages);
}

#[tokio::test]
async fn empty_discovery_skips_the_answer() {
    let harness = Harness::new(
        FakeEndpoint::default()
            .respond(&[delta("```json\n{\"filepath\": []}\n```").as_str(), "data: [DONE]"]),
    );
    let outcome = harness
        .orchestrator
        .ask("is there a config parser?", true, false, Arc::new(Recorder::default()))
        .await
        .unwrap();
    assert_eq!(outcome, DiscoveryOutcome::NoRelevantFiles);

    let messages = harness.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages.get(3).is_none());
    assert_eq!(harness.endpoint.requests().len(), 1);
    assert_eq!(harness.files.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_files_skip_the_answer() {
    let harness = Harness::with_files(
        FakeEndpoint::default()
            .respond(&[delta("```json\n{\"filepath\": [\"README.md\", \"src/empty.rs\"]}\n```").as_str(), "data: [DONE]"])
            .respond(&[delta("should not be requested").as_str(), "data: [DONE]"]),
        FakeFiles::blank(),
    );
    let outcome = harness
        .orchestrator
        .ask("what is in the readme?", true, false, Arc::new(Recorder::default()))
        .await
        .unwrap();
    assert_eq!(outcome, DiscoveryOutcome::NoFileContent);

    assert_eq!(harness.endpoint.requests().len(), 1);
    assert_eq!(harness.files.fetches.load(Ordering::SeqCst), 2);
    let messages = harness.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages.get(3).is_none());
    assert!(messages.iter().all(|m| !m.is_analyzing));
    assert!(!harness.orchestrator.controller().is_streaming());
}

#[tokio::test]
async fn discovery_prompt_replaces_the_question() {
    let harness = Harness::new(
        FakeEndpoint::default()
            .respond(&[delta("```json\n{\"analysis\": \"entry point\", \"reason\": [\"main\"], \"filepath\": [\"src/main.rs\", \"src/lib.rs\"]}\n```").as_str()])
            .respond(&[delta("It starts ").as_str(), delta("the server.").as_str(), "data: [DONE]"]),
    );
    let recorder = Arc::new(Recorder::default());
    let outcome = harness
        .orchestrator
        .ask("how does it start?", true, false, recorder.clone())
        .await
        .unwrap();
    let DiscoveryOutcome::Answered(turn) = outcome else {
        panic!("expected an answer, got {outcome:?}");
    };
    assert_eq!(turn.index, 3);
    assert_eq!(turn.end, StreamEnd::Completed);
    assert_eq!(harness.files.fetches.load(Ordering::SeqCst), 2);

    let requests = harness.endpoint.requests();
    assert_eq!(requests.len(), 2);
    let discovery = &requests[0].messages;
    assert_eq!(discovery.len(), 2);
    assert!(discovery[1].content.contains("how does it start?"));
    assert!(discovery[1].content.contains("filepath"));
    let answer = &requests[1].messages[1].content;
    assert!(answer.contains("src/main.rs:\n```rs\nfn src_main_rs() {}\n```src/lib.rs:"));

    let messages = harness.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1], Message::user("how does it start?"));
    assert!(messages[2].content.contains("entry point"));
    assert_eq!(messages[3], Message::assistant("It starts the server."));

    let calls = recorder.calls.lock().unwrap();
    assert!(calls.starts_with(&[Some(2)]));
    assert_eq!(calls.last(), Some(&Some(3)));
}

#[tokio::test]
async fn stop_halts_the_stream_once() {
    let harness = Harness::new(
        FakeEndpoint::default().respond_then_stall(&[delta("partial ").as_str(), delta("answer").as_str()]),
    );
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let observer = Arc::new(move |index: Option<usize>| {
        let _ = seen_tx.send(index);
    });

    let orchestrator = harness.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.ask("go", false, false, observer).await });

    assert_eq!(seen_rx.recv().await, Some(Some(2)));
    assert_eq!(seen_rx.recv().await, Some(Some(2)));
    assert!(harness.orchestrator.controller().is_streaming());
    assert_eq!(harness.orchestrator.stop_chat(), StopOutcome::Stopped);
    assert_eq!(seen_rx.recv().await, Some(None));

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, DiscoveryOutcome::Cancelled);
    assert_eq!(harness.orchestrator.stop_chat(), StopOutcome::Idle);
    assert_eq!(harness.orchestrator.stop_chat(), StopOutcome::Idle);

    let messages = harness.messages();
    assert_eq!(messages[2].content, "partial answer");
    assert!(!messages[2].is_analyzing);
    assert!(!harness.orchestrator.controller().is_streaming());
}

#[tokio::test]
async fn newer_request_stops_the_stalled_one() {
    let harness = Harness::new(
        FakeEndpoint::default()
            .respond_then_stall(&[delta("first").as_str()])
            .respond(&[delta("second").as_str(), "data: [DONE]"]),
    );
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let observer = Arc::new(move |index: Option<usize>| {
        let _ = seen_tx.send(index);
    });

    let orchestrator = harness.orchestrator.clone();
    let stalled = tokio::spawn(async move { orchestrator.ask("q1", false, false, observer).await });
    assert_eq!(seen_rx.recv().await, Some(Some(2)));
    assert!(harness.messages()[2].is_analyzing);

    let outcome = harness
        .orchestrator
        .ask("q2", false, false, Arc::new(Recorder::default()))
        .await
        .unwrap();
    assert!(matches!(outcome, DiscoveryOutcome::Answered(turn) if turn.index == 4));

    let first = tokio::time::timeout(Duration::from_secs(5), stalled)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first, DiscoveryOutcome::Cancelled);

    let messages = harness.messages();
    assert_eq!(messages[2].content, "first");
    assert_eq!(messages[3], Message::user("q2"));
    assert_eq!(messages[4].content, "second");
    assert!(messages.iter().all(|m| !m.is_analyzing));
    assert!(!harness.orchestrator.controller().is_streaming());
    assert_eq!(harness.orchestrator.stop_chat(), StopOutcome::Idle);
}

#[tokio::test]
async fn http_failure_leaves_no_stuck_flags() {
    let harness = Harness::new(FakeEndpoint::default());
    let err = harness
        .orchestrator
        .ask("anyone there?", true, false, Arc::new(Recorder::default()))
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert_eq!(err.status_code(), Some(503));
    assert!(!harness.orchestrator.controller().is_streaming());
    assert!(harness.messages().iter().all(|m| !m.is_analyzing));
}

#[tokio::test]
async fn malformed_frames_are_skipped_end_to_end() {
    let harness = Harness::new(FakeEndpoint::default().respond(&[
        delta("one ").as_str(),
        "data: {not json}\n\n",
        delta("two").as_str(),
        "data: [DONE]",
    ]));
    harness
        .orchestrator
        .ask("count", false, false, Arc::new(Recorder::default()))
        .await
        .unwrap();
    assert_eq!(harness.messages()[2].content, "one two");
}

struct Index;

#[async_trait]
impl SemanticSearch for Index {
    async fn perform_semantic_search(&self, query: &str) -> Result<Vec<SearchResult>> {
        Ok(vec![SearchResult::new(query, "fn start() {}")])
    }
}

#[tokio::test]
async fn semantic_search_adds_a_reference_message() {
    let endpoint = Arc::new(FakeEndpoint::default().respond(&[delta("ok").as_str(), "data: [DONE]"]));
    let models = vec![Model::new("https://llm.example.com", "k")];
    let store = ChatStore::new(SessionManager::new(Arc::new(models), Arc::new(Vec::new())));
    store.lock().sessions.create_session().unwrap();
    let orchestrator = ChatOrchestrator::new(endpoint.clone(), store, Arc::new(FakeFiles::default()))
        .with_semantic_search(SemanticSearchAugmenter::new(Arc::new(Index)));

    tokio_test::assert_ok!(
        orchestrator
            .ask("where is start?", false, true, Arc::new(Recorder::default()))
            .await
    );

    let sent = &endpoint.requests()[0].messages;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].content, "where is start?");
    assert_eq!(
        sent[2].content,
        "### Reference\n\n**Query:** where is start?\n**Code:** `fn start() {}`"
    );
    let messages = orchestrator.store().lock().sessions.current().unwrap().messages.clone();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].content, "ok");
}

#[tokio::test]
async fn request_body_merges_model_options() {
    let harness = Harness::new(FakeEndpoint::default().respond(&["data: [DONE]"]));
    harness
        .orchestrator
        .ask("hi", false, false, Arc::new(Recorder::default()))
        .await
        .unwrap();
    let body = serde_json::to_value(&harness.endpoint.requests()[0]).unwrap();
    assert_eq!(body["model"], json!("m"));
    assert_eq!(body["stream"], json!(true));
    assert_eq!(body["messages"][1], json!({"role": "user", "content": "hi"}));
    assert!(body.get("apiKey").is_none());
    assert!(body.get("baseUrl").is_none());
}
