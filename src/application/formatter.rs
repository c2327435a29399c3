//! Output rendering for fetched conversations.
//!
//! Supports structured Markdown for human review and JSON for
//! programmatic use. Context and metadata sections honor the export
//! configuration flags.

use crate::domain::{Conversation, ExportConfig, ExportStats, OutputFormat, Result};

/// Render conversations in the configured output format.
///
/// # Errors
/// Returns a parsing error if JSON serialization fails.
pub fn render(conversations: &[Conversation], export: &ExportConfig) -> Result<String> {
    match export.output_format {
        OutputFormat::Markdown => Ok(format_conversations_markdown(conversations, export)),
        OutputFormat::Json => format_conversations_json(conversations),
    }
}

/// Formats all conversations as one Markdown document.
#[must_use]
pub fn format_conversations_markdown(
    conversations: &[Conversation],
    export: &ExportConfig,
) -> String {
    let mut out = String::from(
        "# Intercom Support Conversations\n\n\
         This document contains customer support conversations exported from \
         Intercom, formatted for LLM analysis.\n\n",
    );

    for conv in conversations {
        out.push_str(&format_conversation_markdown(conv, export));
        out.push('\n');
    }

    out
}

/// Formats a single conversation as Markdown.
#[must_use]
pub fn format_conversation_markdown(conv: &Conversation, export: &ExportConfig) -> String {
    let mut out = String::new();

    out.push_str(&format!("## Conversation {}\n\n", conv.id));
    out.push_str(&format!(
        "**Created:** {}\n\n",
        conv.created_at.format("%Y-%m-%d %H:%M:%S")
    ));

    if let Some(ref title) = conv.title {
        out.push_str(&format!("**Title:** {title}\n\n"));
    }

    if export.include_context {
        out.push_str("### Context\n\n");
        out.push_str(&format!("- **State:** {}\n", conv.state));
        if !conv.tags.is_empty() {
            out.push_str(&format!("- **Tags:** {}\n", conv.tags.join(", ")));
        }
        for (key, value) in &conv.custom_attributes {
            out.push_str(&format!("- **{key}:** {}\n", scalar_display(value)));
        }
        out.push('\n');
    }

    out.push_str("### Messages\n\n");
    for msg in &conv.messages {
        let name = if msg.author.name.is_empty() {
            "Unknown"
        } else {
            &msg.author.name
        };
        out.push_str(&format!("**{name}** ({})", msg.author.kind));
        if export.include_metadata {
            out.push_str(&format!(" — {}", msg.created_at.format("%Y-%m-%d %H:%M:%S")));
        }
        out.push_str("\n\n");
        out.push_str(&msg.body);
        out.push_str("\n\n");
    }

    out.push_str("---\n");
    out
}

/// Formats conversations as a pretty-printed JSON array.
///
/// # Errors
/// Returns a parsing error if serialization fails.
pub fn format_conversations_json(conversations: &[Conversation]) -> Result<String> {
    serde_json::to_string_pretty(conversations).map_err(|e| {
        crate::domain::AppError::Parsing {
            message: format!("Failed to serialize conversations: {e}"),
            source: Some(e),
        }
    })
}

/// Formats export statistics for the run summary.
#[must_use]
pub fn format_stats(stats: &ExportStats) -> String {
    format!(
        "Conversations: {}  Messages: {} ({} user, {} admin)",
        stats.conversation_count, stats.total_messages, stats.user_messages, stats.admin_messages
    )
}

/// Render one custom-attribute scalar without JSON string quoting.
fn scalar_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
