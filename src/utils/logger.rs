// src/utils/logger.rs

use serde_json::Value;
use std::collections::HashMap;

/// Log levels supported by the logger
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    pub fn from_string(s: &str) -> LogLevel {
        match s.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info, // default
        }
    }

    fn to_log_level(&self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

/// Structured component logger emitting one JSON line per event through the
/// `log` facade. Each component owns a logger tagged with its name; extra
/// context keys propagate to every line it emits.
#[derive(Debug, Clone)]
pub struct Logger {
    level: LogLevel,
    component: String,
    context: HashMap<String, Value>,
}

impl Logger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            component: component.into(),
            context: HashMap::new(),
        }
    }

    pub fn from_env(component: impl Into<String>) -> Self {
        let level_str = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let mut logger = Self::new(component);
        logger.level = LogLevel::from_string(&level_str);
        logger
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn get_level(&self) -> &LogLevel {
        &self.level
    }

    pub fn add_context(&mut self, key: &str, value: Value) {
        self.context.insert(key.to_string(), value);
    }

    /// Create a child logger with additional persistent context.
    pub fn child(&self, context: HashMap<String, Value>) -> Self {
        let mut new_context = self.context.clone();
        new_context.extend(context);
        Self {
            level: self.level.clone(),
            component: self.component.clone(),
            context: new_context,
        }
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn error_with(&self, message: &str, fields: &HashMap<String, Value>) {
        self.log(LogLevel::Error, message, Some(fields));
    }

    pub fn warn_with(&self, message: &str, fields: &HashMap<String, Value>) {
        self.log(LogLevel::Warn, message, Some(fields));
    }

    pub fn info_with(&self, message: &str, fields: &HashMap<String, Value>) {
        self.log(LogLevel::Info, message, Some(fields));
    }

    fn log(&self, level: LogLevel, message: &str, fields: Option<&HashMap<String, Value>>) {
        if level > self.level {
            return;
        }

        let mut entry = serde_json::Map::new();
        entry.insert(
            "timestamp".to_string(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );
        entry.insert("level".to_string(), Value::from(level.as_str()));
        entry.insert("component".to_string(), Value::from(self.component.clone()));
        entry.insert("message".to_string(), Value::from(message));
        for (key, value) in &self.context {
            entry.insert(key.clone(), value.clone());
        }
        if let Some(fields) = fields {
            for (key, value) in fields {
                entry.insert(key.clone(), value.clone());
            }
        }

        log::log!(
            target: &self.component,
            level.to_log_level(),
            "{}",
            Value::Object(entry)
        );
    }
}
