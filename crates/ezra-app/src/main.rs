//! Ezra terminal driver - composition root.
//!
//! 1. Load configuration from TOML and apply command-line overrides
//! 2. Open the configured Wisdom notes store
//! 3. Build the assistant responder and the conversation session
//! 4. Print session events while reading commands from stdin

mod cli;
mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use ezra_chat::{AssistantResponder, CaptureOptions, ConversationSession};
use ezra_core::config::{EzraConfig, NotesStoreKind};
use ezra_core::events::SessionEvent;
use ezra_core::ports::{InMemoryNotesStore, NotesStore};
use ezra_core::types::{Attachment, Message, Sender};
use ezra_storage::{Database, MarkdownNotesStore, SqliteNotesStore, WisdomArchive};

use cli::{expand_home, CliArgs};
use commands::{Command, CommandError};

type BoxError = Box<dyn std::error::Error>;

fn open_notes_store(
    config: &EzraConfig,
    archive: &WisdomArchive,
) -> Result<Arc<dyn NotesStore>, BoxError> {
    let store: Arc<dyn NotesStore> = match config.wisdom.store {
        NotesStoreKind::Memory => Arc::new(InMemoryNotesStore::new()),
        NotesStoreKind::Sqlite => {
            let data_dir = expand_home(&config.general.data_dir);
            std::fs::create_dir_all(&data_dir)?;
            let db_path = data_dir.join("ezra.db");
            let db = Database::new(&db_path)?;
            tracing::info!(path = %db_path.display(), "SQLite notes store opened");
            Arc::new(SqliteNotesStore::new(Arc::new(db)))
        }
        NotesStoreKind::Markdown => {
            tracing::info!(dir = %archive.dir().display(), "Markdown notes store selected");
            Arc::new(MarkdownNotesStore::new(
                archive.clone(),
                config.wisdom.default_category.clone(),
            ))
        }
    };
    Ok(store)
}

fn print_message(message: &Message) {
    let label = match message.sender {
        Sender::User => return,
        other => other.label(),
    };
    println!("{}: {}", label, message.text);
    for attachment in &message.attachments {
        println!("  [attachment: {} ({})]", attachment.name, attachment.human_size());
    }
}

/// Print assistant and system messages as they land.
async fn print_events(session: Arc<ConversationSession>) {
    let mut events = session.subscribe();
    loop {
        match events.recv().await {
            Ok(SessionEvent::MessageAppended { message_id, .. }) => {
                if let Ok(message) = session.message(&message_id) {
                    print_message(&message);
                }
            }
            Ok(SessionEvent::TypingChanged { typing: true, .. }) => {
                println!("(Ezra is typing...)");
            }
            Ok(SessionEvent::ReplyFailed {
                reason, retryable, ..
            }) => {
                tracing::warn!(retryable, reason = %reason, "Reply failed");
            }
            Ok(SessionEvent::SessionClosed { .. }) | Err(RecvError::Closed) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event printer lagged");
            }
        }
    }
}

/// Interactive state that lives outside the session.
struct Driver {
    session: Arc<ConversationSession>,
    archive: WisdomArchive,
    export_dir: PathBuf,
    default_format: String,
    staged: Vec<Attachment>,
}

impl Driver {
    async fn run(&mut self, command: Command) -> Result<(), BoxError> {
        match command {
            Command::Say(text) => {
                let attachments = std::mem::take(&mut self.staged);
                self.session.submit(text, attachments)?;
            }
            Command::Attach(path) => {
                let metadata = tokio::fs::metadata(&path).await?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                let attachment = Attachment::new(name, metadata.len());
                println!(
                    "Attached {} ({}), sent with your next message",
                    attachment.name,
                    attachment.human_size()
                );
                self.staged.push(attachment);
            }
            Command::History => {
                for (i, message) in self.session.messages().iter().enumerate() {
                    let marker = if message.wisdom_captured { " *" } else { "" };
                    println!(
                        "[{}] {} {}{}: {}",
                        i + 1,
                        message.timestamp.display(),
                        message.sender.label(),
                        marker,
                        message.text
                    );
                }
            }
            Command::Capture { index, category } => {
                let messages = self.session.messages();
                let message = messages
                    .as_slice()
                    .get(index - 1)
                    .ok_or_else(|| format!("no message number {}", index))?;
                let options = CaptureOptions {
                    category,
                    ..CaptureOptions::default()
                };
                let note = self.session.capture(&message.id, &options)?;
                println!("Captured \"{}\" into Wisdom", note.title);
            }
            Command::Export { format, dir } => {
                let format = format.unwrap_or_else(|| self.default_format.clone());
                let doc = self.session.export_named(&format)?;
                let dir = dir.unwrap_or_else(|| self.export_dir.clone());
                let path = doc.write_to(&dir)?;
                println!("Exported {} to {}", doc.format, path.display());
            }
            Command::Wisdom { category: None } => {
                let notes = self.session.wisdom_notes(None)?;
                if notes.is_empty() {
                    println!("No Wisdom notes yet");
                }
                for category in self.session.wisdom_categories()? {
                    let count = notes
                        .iter()
                        .filter(|n| n.category.as_deref() == Some(category.as_str()))
                        .count();
                    println!("{} ({})", category, count);
                }
                let uncategorised = notes.iter().filter(|n| n.category.is_none()).count();
                if uncategorised > 0 {
                    println!("Uncategorised ({})", uncategorised);
                }
            }
            Command::Wisdom {
                category: Some(category),
            } => {
                let notes = self.session.wisdom_notes(Some(category.as_str()))?;
                if notes.is_empty() {
                    println!("No notes in {}", category);
                }
                for note in notes {
                    println!("[{}] {}: {}", category, note.title, note.excerpt);
                }
            }
            Command::Archive => {
                let messages = self.session.messages();
                let path = self.archive.archive_session(messages.as_slice())?;
                println!("Conversation archived to {}", path.display());
            }
            Command::Reset => {
                self.staged.clear();
                self.session.reset()?;
                println!("Conversation cleared");
            }
            Command::Tts(enabled) => {
                self.session.set_tts(enabled)?;
                println!("Text to speech {}", if enabled { "on" } else { "off" });
            }
            Command::Record(recording) => {
                self.session.set_recording(recording)?;
                println!(
                    "Recording {}",
                    if recording { "started" } else { "stopped" }
                );
            }
            Command::Health => match self.session.health().await {
                Ok(()) => println!("Assistant backend is healthy"),
                Err(e) => println!("Assistant backend is unhealthy: {}", e),
            },
            Command::Help => println!("{}", commands::HELP),
            Command::Quit => {}
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match EzraConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (EzraConfig::default(), Some(e)),
    };
    args.apply_overrides(&mut config);

    // Tracing goes to stderr so it never interleaves with the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(
                args.resolve_log_filter(&config.general.log_level),
            )
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Ezra v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Using default configuration"
        ),
    }

    let archive = WisdomArchive::new(expand_home(&config.wisdom.archive_dir));
    let notes = open_notes_store(&config, &archive)?;
    let responder = AssistantResponder::from_config(&config.assistant)?;
    let session = Arc::new(ConversationSession::new(&config, responder, notes)?);

    for message in session.messages().iter() {
        print_message(message);
    }
    println!("Type a message, or /help for commands.");

    let printer = tokio::spawn(print_events(session.clone()));

    let mut driver = Driver {
        session: session.clone(),
        archive,
        export_dir: expand_home(&config.export.output_dir),
        default_format: config.export.default_format.clone(),
        staged: Vec::new(),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(e) = driver.run(command).await {
                    println!("! {}", e);
                }
            }
            Err(CommandError::Empty) => {}
            Err(e) => println!("! {}", e),
        }
    }

    session.close();
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer ended abnormally");
    }
    tracing::info!("Ezra shut down");
    Ok(())
}
