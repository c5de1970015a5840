//! Logging that reaches both the local tracing subscriber and the MCP client.
//!
//! The client-side threshold is an MCP `LoggingLevel` held in an atomic so
//! `logging/setLevel` can change it while tool calls are running.

use rmcp::{
    RoleServer,
    model::{LoggingLevel, LoggingMessageNotificationParam},
    service::Peer,
};
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing::Level;

/// MCP levels in increasing severity.
const LEVELS: [LoggingLevel; 8] = [
    LoggingLevel::Debug,
    LoggingLevel::Info,
    LoggingLevel::Notice,
    LoggingLevel::Warning,
    LoggingLevel::Error,
    LoggingLevel::Critical,
    LoggingLevel::Alert,
    LoggingLevel::Emergency,
];

fn rank(level: LoggingLevel) -> u8 {
    LEVELS.iter().position(|l| *l == level).unwrap_or(0) as u8
}

/// Minimum level forwarded to the client.
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    pub fn new(level: LoggingLevel) -> Self {
        Self(AtomicU8::new(rank(level)))
    }

    pub fn get(&self) -> LoggingLevel {
        LEVELS[self.0.load(Ordering::Relaxed) as usize % LEVELS.len()]
    }

    pub fn set(&self, level: LoggingLevel) {
        self.0.store(rank(level), Ordering::Relaxed);
    }

    pub fn should_log(&self, level: LoggingLevel) -> bool {
        rank(level) >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(LoggingLevel::Info)
    }
}

/// Closest tracing level of an MCP level.
pub fn tracing_level(level: LoggingLevel) -> Level {
    match level {
        LoggingLevel::Debug => Level::DEBUG,
        LoggingLevel::Info | LoggingLevel::Notice => Level::INFO,
        LoggingLevel::Warning => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Logger handed to tool handlers.
#[derive(Clone, Default)]
pub struct Logger {
    peer: Option<Peer<RoleServer>>,
    level_filter: Arc<LogLevelFilter>,
    name: Option<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(mut self, peer: Peer<RoleServer>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_level_filter(mut self, filter: Arc<LogLevelFilter>) -> Self {
        self.level_filter = filter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Emit locally, then forward to the client when connected and the level
    /// passes the client's filter.
    pub fn log(&self, level: LoggingLevel, message: &str, data: Option<Value>) {
        let logger = self.name.as_deref().unwrap_or("fold-coord");
        match tracing_level(level) {
            Level::ERROR => tracing::error!(logger, "{}", message),
            Level::WARN => tracing::warn!(logger, "{}", message),
            Level::INFO => tracing::info!(logger, "{}", message),
            _ => tracing::debug!(logger, "{}", message),
        }

        if !self.level_filter.should_log(level) {
            return;
        }
        if let Some(ref peer) = self.peer {
            let param = LoggingMessageNotificationParam {
                level,
                logger: self.name.clone(),
                data: data.unwrap_or_else(|| json!({ "message": message })),
            };
            let peer = peer.clone();
            tokio::spawn(async move {
                let _ = peer.notify_logging_message(param).await;
            });
        }
    }

    pub fn debug(&self, msg: &str) {
        self.log(LoggingLevel::Debug, msg, None);
    }

    pub fn info(&self, msg: &str) {
        self.log(LoggingLevel::Info, msg, None);
    }

    pub fn warning(&self, msg: &str) {
        self.log(LoggingLevel::Warning, msg, None);
    }

    pub fn error(&self, msg: &str) {
        self.log(LoggingLevel::Error, msg, None);
    }
}
