//! User-facing alerts
//!
//! Facades report things a person should notice (a revoked offer, a new
//! notification) through an [`AlertSink`]. The default sink only logs.

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub body: String,
}

impl Alert {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Info,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warning,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Must not block; called from the facade's event pump
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => info!("[Alert] {}: {}", alert.title, alert.body),
            AlertLevel::Warning => warn!("[Alert] {}: {}", alert.title, alert.body),
        }
    }
}
