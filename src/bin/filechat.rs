//! Interactive chat about a code base.
//!
//! Each question first asks the model which project files are relevant, then answers it from
//! the content of those files.
//!
//! # Usage
//!
//! ```bash
//! # Models and projects come from a YAML catalog
//! FILECHAT_API_KEY=sk-... filechat --config catalog.yaml --root ~/src/project
//!
//! # Chat without file discovery, no reply timeout
//! filechat --config catalog.yaml --no-discovery --timeout 0
//! ```
//!
//! Ctrl+C stops the reply that is streaming.  Type `/help` for the slash commands.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use filechat::chat::{
    Catalog, ChatArgs, ChatCommand, ChatConfig, PlainTextObserver, help_text, parse_command,
};
use filechat::{
    ChatOrchestrator, ChatStore, DiscoveryOutcome, LocalFiles, OpenAiCompatible,
    ProgressObserver, SessionManager,
};

const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Main entry point for the filechat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("filechat [OPTIONS]");
    let config = ChatConfig::from(args);
    let out = Output {
        use_color: config.use_color,
    };

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::default(),
    }
    .with_env_api_key();
    if catalog.models.is_empty() {
        out.error("No models configured; pass --config with a catalog listing at least one model.");
    }
    let catalog = Arc::new(catalog);

    let store = ChatStore::new(SessionManager::new(catalog.clone(), catalog));
    store.lock().sessions.create_session()?;

    let transport = OpenAiCompatible::with_options(Some(config.connect_timeout))?;
    let orchestrator = ChatOrchestrator::new(
        Arc::new(transport),
        store.clone(),
        Arc::new(LocalFiles::new(&config.project_root)),
    )
    .with_stream_timeout(config.stream_timeout);

    let observer = Arc::new(PlainTextObserver::new(store.clone(), config.use_color));
    let progress: Arc<dyn ProgressObserver> = observer.clone();

    let controller = orchestrator.controller().clone();
    ctrlc::set_handler(move || {
        controller.stop_chat();
    })?;

    let mut discovery = config.discovery;
    let mut rl = DefaultEditor::new()?;

    println!(
        "filechat (project root: {}, discovery {})",
        config.project_root.display(),
        on_off(discovery)
    );
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let line = match rl.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                out.error(&format!("Input error: {}", err));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        if let Some(cmd) = parse_command(line) {
            match cmd {
                ChatCommand::Quit => {
                    println!("Goodbye!");
                    break;
                }
                ChatCommand::Help => {
                    for line in help_text().lines() {
                        println!("    {}", line);
                    }
                }
                ChatCommand::New => match store.lock().sessions.create_session() {
                    Ok(session) => out.info(&format!("Started session {}.", session.id)),
                    Err(err) => out.error(&err.to_string()),
                },
                ChatCommand::Sessions => print_sessions(&store),
                ChatCommand::Switch(index) => match store.lock().sessions.select_session(index) {
                    Some(session) => out.info(&format!(
                        "Switched to session {} ({} messages).",
                        session.id,
                        session.messages.len()
                    )),
                    None => out.error(&format!("No session {index}.")),
                },
                ChatCommand::Delete(index) => match store.lock().sessions.delete_session(index) {
                    Some(session) => out.info(&format!("Deleted session {}.", session.id)),
                    None => out.error(&format!("No session {index}.")),
                },
                ChatCommand::Save => {
                    if store.lock().sessions.update_session() {
                        out.info("Session saved.");
                    } else {
                        out.error("The current session is no longer in the session list.");
                    }
                }
                ChatCommand::Models => print_models(&store),
                ChatCommand::Model(index) => {
                    let mut state = store.lock();
                    match state.sessions.models().get(index).cloned() {
                        Some(model) => {
                            let name = model.name().unwrap_or(&model.base_url).to_string();
                            match state.sessions.set_model(Some(model)) {
                                Ok(()) => out.info(&format!("Model changed to {name}.")),
                                Err(err) => out.error(&err.to_string()),
                            }
                        }
                        None => out.error(&format!("No model {index}.")),
                    }
                }
                ChatCommand::Discovery(enabled) => {
                    discovery = enabled;
                    out.info(&format!("File discovery {}.", on_off(enabled)));
                }
                ChatCommand::Stop => out.info(orchestrator.stop_chat().describe()),
                ChatCommand::Invalid(message) => out.error(&message),
            }
            continue;
        }

        observer.reset();
        println!("Assistant:");
        match orchestrator
            .ask(line, discovery, config.semantic_search, progress.clone())
            .await
        {
            Ok(DiscoveryOutcome::Answered(_)) => println!("\n"),
            Ok(DiscoveryOutcome::NoRelevantFiles) => {
                out.info("The model found no relevant files for that question.")
            }
            Ok(DiscoveryOutcome::NoFileContent) => out.info("The selected files are empty."),
            Ok(DiscoveryOutcome::Cancelled) => println!(),
            Err(err) => out.error(&err.to_string()),
        }
    }

    Ok(())
}

struct Output {
    use_color: bool,
}

impl Output {
    fn info(&self, message: &str) {
        if self.use_color {
            println!("\n{ANSI_DIM}{message}{ANSI_RESET}");
        } else {
            println!("\n{message}");
        }
    }

    fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error: {message}{ANSI_RESET}");
        } else {
            eprintln!("\nError: {message}");
        }
    }
}

fn print_sessions(store: &ChatStore) {
    let state = store.lock();
    let current = state.sessions.current().map(|s| s.id);
    if state.sessions.sessions().is_empty() {
        println!("    (no sessions)");
    }
    for (index, session) in state.sessions.sessions().iter().enumerate() {
        let marker = if Some(session.id) == current { '*' } else { ' ' };
        let title = session
            .messages
            .iter()
            .find(|m| m.role == filechat::Role::User)
            .map(|m| m.content.lines().next().unwrap_or_default().to_string())
            .unwrap_or_else(|| "(empty)".to_string());
        println!(
            "  {marker} {index}: {} ({} messages) {title}",
            session.id,
            session.messages.len()
        );
    }
}

fn print_models(store: &ChatStore) {
    let state = store.lock();
    let current = state.sessions.current().and_then(|s| s.model.clone());
    for (index, model) in state.sessions.models().iter().enumerate() {
        let marker = if current.as_ref() == Some(model) { '*' } else { ' ' };
        println!(
            "  {marker} {index}: {} at {}",
            model.name().unwrap_or("(default)"),
            model.base_url
        );
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
