//! Application layer - use cases and orchestration.
//!
//! Configuration resolution, retry decision logic, and output rendering.

pub mod formatter;
pub mod resolver;
pub mod retry;

pub use formatter::{
    format_conversation_markdown, format_conversations_json, format_conversations_markdown,
    format_stats, render,
};
pub use resolver::{resolve, ConfigLayer, ExportLayer, IntercomLayer, RetryLayer};
pub use retry::{
    run_with_retry, Classification, ClassifiedError, RetryDecision, RetryPolicy, Sleeper,
    TokioSleeper,
};
