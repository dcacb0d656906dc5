//! Conversation export.
//!
//! Every format renders all messages in store order with sender, timestamp,
//! text and one line per attachment. The body depends only on the
//! messages; the generation time is kept in a separate `header`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ezra_core::config::ExportConfig;
use ezra_core::types::{Attachment, Message, Timestamp};

use crate::error::ExportError;
use crate::pdf::{self, Line, Style};

// =============================================================================
// Formats
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    PlainDocument,
    Markdown,
    /// Portable document (PDF).
    RichDocument,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::PlainDocument => "txt",
            ExportFormat::Markdown => "md",
            ExportFormat::RichDocument => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::PlainDocument => "text/plain; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::RichDocument => "application/pdf",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::PlainDocument => "plainDocument",
            ExportFormat::Markdown => "markdown",
            ExportFormat::RichDocument => "richDocument",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "plaindocument" | "plain_document" | "txt" | "text" => {
                Ok(ExportFormat::PlainDocument)
            }
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "rich" | "richdocument" | "rich_document" | "pdf" => Ok(ExportFormat::RichDocument),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

// =============================================================================
// ExportedDocument
// =============================================================================

/// A rendered conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    pub format: ExportFormat,
    pub generated_at: Timestamp,
    /// Generation metadata, kept out of `body`.
    pub header: String,
    pub body: Vec<u8>,
    /// Suggested file name, e.g. `ezra-conversation-20240301-093000.md`.
    pub file_name: String,
}

impl ExportedDocument {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Bytes of the complete file.
    ///
    /// Text formats are prefixed with the header. A portable document is
    /// written as-is so its byte offsets stay valid.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.format {
            ExportFormat::RichDocument => self.body.clone(),
            _ => {
                let mut out = Vec::with_capacity(self.header.len() + self.body.len());
                out.extend_from_slice(self.header.as_bytes());
                out.extend_from_slice(&self.body);
                out
            }
        }
    }

    /// Write the document into `dir` under its suggested name.
    ///
    /// Goes through a temporary file so a failed write leaves no partial
    /// document behind.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let target = dir.join(&self.file_name);
        let partial = dir.join(format!(".{}.partial", self.file_name));
        let result = fs::create_dir_all(dir)
            .and_then(|_| fs::write(&partial, self.to_bytes()))
            .and_then(|_| fs::rename(&partial, &target));
        if let Err(e) = result {
            let _ = fs::remove_file(&partial);
            return Err(ExportError::Render(format!(
                "failed to write {}: {}",
                target.display(),
                e
            )));
        }
        tracing::info!(path = %target.display(), format = %self.format, "Conversation exported");
        Ok(target)
    }
}

// =============================================================================
// ExportService
// =============================================================================

pub struct ExportService {
    title: String,
}

impl ExportService {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.title.clone())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Render `messages` in `format`.
    ///
    /// Fails with [`ExportError::Render`] when the portable document's fonts
    /// cannot show some of the text; nothing is substituted.
    pub fn export(
        &self,
        messages: &[Message],
        format: ExportFormat,
    ) -> Result<ExportedDocument, ExportError> {
        let generated_at = Timestamp::now();
        let stamp = generated_at.display();
        let (header, body) = match format {
            ExportFormat::PlainDocument => (
                format!("Exported: {}\n\n", stamp),
                render_plain(&self.title, messages).into_bytes(),
            ),
            ExportFormat::Markdown => (
                format!("<!-- Exported: {} -->\n\n", stamp),
                render_markdown(&self.title, messages).into_bytes(),
            ),
            ExportFormat::RichDocument => (
                format!("Exported: {}", stamp),
                render_rich(&self.title, messages)?,
            ),
        };
        let file_name = format!(
            "ezra-conversation-{}.{}",
            generated_at.to_datetime().format("%Y%m%d-%H%M%S"),
            format.extension()
        );
        tracing::debug!(
            format = %format,
            messages = messages.len(),
            bytes = body.len(),
            "Conversation rendered"
        );
        Ok(ExportedDocument {
            format,
            generated_at,
            header,
            body,
            file_name,
        })
    }

    /// Export with the format given by name (`plain`, `markdown`, `rich`, ...).
    pub fn export_named(
        &self,
        messages: &[Message],
        format: &str,
    ) -> Result<ExportedDocument, ExportError> {
        let format = format.parse::<ExportFormat>()?;
        self.export(messages, format)
    }
}

fn attachment_line(attachment: &Attachment) -> String {
    format!(
        "[attachment: {} ({}, {})]",
        attachment.name,
        attachment.human_size(),
        attachment.kind
    )
}

fn render_plain(title: &str, messages: &[Message]) -> String {
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str(&"=".repeat(title.chars().count()));
    out.push_str("\n\n");
    for message in messages {
        out.push_str(&format!(
            "[{}] {}:\n",
            message.timestamp.display(),
            message.sender.label()
        ));
        if !message.text.is_empty() {
            out.push_str(&message.text);
            out.push('\n');
        }
        for attachment in &message.attachments {
            out.push_str("  ");
            out.push_str(&attachment_line(attachment));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn render_markdown(title: &str, messages: &[Message]) -> String {
    let mut out = format!("# {}\n\n", title);
    for message in messages {
        out.push_str(&format!(
            "**{}** \u{b7} {}\n\n",
            message.sender.label(),
            message.timestamp.display()
        ));
        if !message.text.is_empty() {
            out.push_str(&message.text);
            out.push_str("\n\n");
        }
        for attachment in &message.attachments {
            out.push_str("- ");
            out.push_str(&attachment_line(attachment));
            out.push('\n');
        }
        if !message.attachments.is_empty() {
            out.push('\n');
        }
        out.push_str("---\n\n");
    }
    out
}

fn render_rich(title: &str, messages: &[Message]) -> Result<Vec<u8>, ExportError> {
    let mut lines = vec![Line::new(Style::Title, title), Line::blank()];
    for message in messages {
        lines.push(Line::new(
            Style::Heading,
            format!(
                "{} \u{b7} {}",
                message.sender.label(),
                message.timestamp.display()
            ),
        ));
        if !message.text.is_empty() {
            lines.push(Line::new(Style::Body, message.text.as_str()));
        }
        for attachment in &message.attachments {
            lines.push(Line::new(Style::Body, attachment_line(attachment)));
        }
        lines.push(Line::blank());
    }
    pdf::render(title, &lines).map_err(|pdf::Unencodable(ch)| {
        ExportError::Render(format!(
            "character '{}' (U+{:04X}) has no glyph in the portable document font",
            ch, ch as u32
        ))
    })
}

// =============================================================================
// Tests
// =============================================================================
