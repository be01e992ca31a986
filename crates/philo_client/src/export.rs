//! Transcript export to Markdown and plain text.
//!
//! Output depends only on the messages, the labels and the generation time,
//! so identical input always yields identical documents.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::error::SessionError;
use crate::transcript::{pair_exchanges, Exchange, Message};

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Plain,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::Plain => "text/plain",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Plain => "txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown export format: {0} (expected md or txt)")]
pub struct UnknownFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" | "1" => Ok(ExportFormat::Markdown),
            "txt" | "text" | "plain" | "2" => Ok(ExportFormat::Plain),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

/// Names printed in exported documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLabels {
    pub assistant_name: String,
    pub app_name: String,
}

impl Default for ExportLabels {
    fn default() -> Self {
        Self {
            assistant_name: "Kuczynski".into(),
            app_name: "Ask a Philosopher - J.-M. Kuczynski AI Assistant".into(),
        }
    }
}

/// A rendered export ready to be written by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub format: ExportFormat,
    /// Suggested file name; callers may choose their own.
    pub filename: String,
    pub body: String,
}

impl Document {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body.into_bytes()
    }
}

fn rule(c: char) -> String {
    std::iter::repeat(c).take(RULE_WIDTH).collect()
}

fn filename(prefix: &str, format: ExportFormat, at: &DateTime<Local>) -> String {
    format!("{prefix}-{}.{}", at.timestamp_millis(), format.extension())
}

/// Render one exchange. Fails with `EmptyExport` unless the answer completed.
pub fn export_exchange(
    exchange: &Exchange<'_>,
    format: ExportFormat,
    labels: &ExportLabels,
    generated_at: DateTime<Local>,
) -> Result<Document, SessionError> {
    if !exchange.is_complete() {
        return Err(SessionError::EmptyExport);
    }
    let date = generated_at.format("%B %-d, %Y");
    let name = &labels.assistant_name;
    let question = exchange.user.content();
    let answer = exchange.assistant.content();
    let sources = exchange.assistant.sources().filter(|s| !s.is_empty());

    let mut body = String::new();
    match format {
        ExportFormat::Markdown => {
            let _ = write!(
                body,
                "# Conversation with {name}\nDate: {date}\n\n## Exchange\n\n\
                 **User:** {question}\n\n**{name}:** {answer}\n\n"
            );
            if let Some(sources) = sources {
                let _ = write!(body, "**Sources: {sources}**\n\n");
            }
            let _ = write!(body, "---\n\n*Generated by {}*\n", labels.app_name);
        }
        ExportFormat::Plain => {
            let upper = name.to_uppercase();
            let _ = write!(
                body,
                "CONVERSATION WITH {upper}\nDate: {date}\n\n{eq}\n\n\
                 USER:\n{question}\n\n{dash}\n\n{upper}:\n{answer}\n\n",
                eq = rule('='),
                dash = rule('-'),
            );
            if let Some(sources) = sources {
                let _ = write!(body, "{}\n\nSources: {sources}\n\n", rule('-'));
            }
            let _ = write!(body, "{}\n\nGenerated by {}\n", rule('='), labels.app_name);
        }
    }

    Ok(Document {
        format,
        filename: filename("kuczynski-conversation", format, &generated_at),
        body,
    })
}

/// Render every settled exchange, numbered by position. Answers that did not
/// complete are included as they were shown.
pub fn export_transcript(
    messages: &[Message],
    format: ExportFormat,
    labels: &ExportLabels,
    generated_at: DateTime<Local>,
) -> Result<Document, SessionError> {
    let exchanges: Vec<(usize, Exchange<'_>)> = pair_exchanges(messages)
        .into_iter()
        .enumerate()
        .filter(|(_, ex)| ex.is_settled())
        .map(|(i, ex)| (i + 1, ex))
        .collect();
    if exchanges.is_empty() {
        return Err(SessionError::EmptyExport);
    }

    let date = generated_at.format("%B %-d, %Y, %I:%M %p");
    let name = &labels.assistant_name;
    let upper = name.to_uppercase();
    let total = exchanges.len();
    let mut body = String::new();

    match format {
        ExportFormat::Markdown => {
            let _ = write!(
                body,
                "# Complete Conversation with {name}\nDate: {date}\n\n\
                 Total Exchanges: {total}\n\n---\n\n"
            );
            for (number, ex) in &exchanges {
                let _ = write!(
                    body,
                    "## Exchange {number}\n\n**USER:**\n{}\n\n**{upper}:**\n{}\n\n",
                    ex.user.content(),
                    ex.assistant.content()
                );
                if let Some(sources) = ex.assistant.sources().filter(|s| !s.is_empty()) {
                    let _ = write!(body, "**Sources: {sources}**\n\n");
                }
                body.push_str("---\n\n");
            }
            let _ = writeln!(body, "\n*Generated by {}*", labels.app_name);
        }
        ExportFormat::Plain => {
            let _ = write!(
                body,
                "COMPLETE CONVERSATION WITH {upper}\nDate: {date}\n\
                 Total Exchanges: {total}\n\n{}\n\n",
                rule('=')
            );
            for (number, ex) in &exchanges {
                let _ = write!(
                    body,
                    "EXCHANGE {number}\n\nUSER:\n{}\n\n{}\n\n{upper}:\n{}\n\n",
                    ex.user.content(),
                    rule('-'),
                    ex.assistant.content()
                );
                if let Some(sources) = ex.assistant.sources().filter(|s| !s.is_empty()) {
                    let _ = write!(body, "Sources: {sources}\n\n");
                }
                let _ = write!(body, "{}\n\n", rule('='));
            }
            let _ = writeln!(body, "\nGenerated by {}", labels.app_name);
        }
    }

    Ok(Document {
        format,
        filename: filename("kuczynski-full-conversation", format, &generated_at),
        body,
    })
}
