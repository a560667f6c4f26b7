//! Exporting a room's transcript.
//!
//! Exports are built from the session's message record, never from the view,
//! so they contain exactly what the backend stored plus the replies finalized
//! during this session.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::to_writer_pretty;

use crate::format::format;
use crate::{Error, Message, Result, Role};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// A standalone HTML document.
    Html,
    /// Markdown, one section per message.
    Markdown,
    /// The raw messages as JSON.
    Json,
}

impl ExportFormat {
    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "html" | "htm" => Ok(ExportFormat::Html),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::validation(
                format!("unknown export format: {other}"),
                Some("format".to_string()),
            )),
        }
    }
}

#[derive(Serialize)]
struct TranscriptFile<'a> {
    version: u8,
    title: &'a str,
    messages: &'a [Message],
}

/// Render a transcript in the given format.
pub fn render(export: ExportFormat, title: &str, messages: &[Message]) -> Result<String> {
    match export {
        ExportFormat::Html => Ok(to_html(title, messages)),
        ExportFormat::Markdown => Ok(to_markdown(title, messages)),
        ExportFormat::Json => {
            let transcript = TranscriptFile {
                version: 1,
                title,
                messages,
            };
            serde_json::to_string_pretty(&transcript).map_err(Error::from)
        }
    }
}

/// Write a transcript to a file.
pub fn export_to_path<P: AsRef<Path>>(
    export: ExportFormat,
    title: &str,
    messages: &[Message],
    path: P,
) -> Result<()> {
    let file = File::create(path.as_ref())
        .map_err(|err| Error::io("failed to create export file", err))?;
    let mut writer = BufWriter::new(file);
    match export {
        ExportFormat::Json => {
            let transcript = TranscriptFile {
                version: 1,
                title,
                messages,
            };
            to_writer_pretty(&mut writer, &transcript).map_err(|err| {
                Error::serialization("failed to serialize transcript", Some(Box::new(err)))
            })?;
        }
        _ => {
            writer
                .write_all(render(export, title, messages)?.as_bytes())
                .map_err(|err| Error::io("failed to write export file", err))?;
        }
    }
    writer
        .flush()
        .map_err(|err| Error::io("failed to write export file", err))
}

/// A standalone HTML document.  User text is escaped; assistant text is
/// formatted the same way the transcript shows it.
pub fn to_html(title: &str, messages: &[Message]) -> String {
    let title = escape_html(title);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{title}</title>\n</head>\n<body>\n"));
    out.push_str(&format!("<h1>{title}</h1>\n"));
    for message in messages {
        let body = match message.role {
            Role::User => escape_html(&message.content).replace('\n', "<br>"),
            Role::Assistant => format(&message.content),
        };
        out.push_str(&format!("<div class=\"message-container {}\">\n", message.role));
        out.push_str(&format!("<div class=\"message\">{body}</div>\n"));
        if let Some(created_at) = message.created_at {
            out.push_str(&format!(
                "<div class=\"timestamp\">{}</div>\n",
                created_at.clock()
            ));
        }
        out.push_str("</div>\n");
    }
    out.push_str("</body>\n</html>\n");
    out
}

/// Markdown with one heading per message.
pub fn to_markdown(title: &str, messages: &[Message]) -> String {
    let mut out = format!("# {title}\n");
    for message in messages {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        match message.created_at {
            Some(created_at) => out.push_str(&format!("\n## {speaker} ({})\n\n", created_at.clock())),
            None => out.push_str(&format!("\n## {speaker}\n\n")),
        }
        out.push_str(message.content.trim_end());
        out.push('\n');
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
