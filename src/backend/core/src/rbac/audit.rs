//! Audit events for authorization decisions.
//!
//! Recording is fire-and-forget: [`AuditSink::record`] never blocks the
//! request and never fails from the caller's point of view. The default
//! [`ChannelAuditSink`] hands events to a background task through a bounded
//! channel and drops them, logging an error, when the channel is full.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info};

use super::models::{ActionType, ResourceType, UserWithRole};
use crate::config::AuditSettings;
use crate::telemetry::metrics::AuditDropCounter;
use crate::telemetry::SensitiveFieldRedactor;

/// One terminal authorization decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub resource: ResourceType,
    pub action: ActionType,
    pub granted: bool,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AuditEvent {
    pub fn new(
        user_id: impl Into<String>,
        resource: ResourceType,
        action: ActionType,
        granted: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: user_id.into(),
            resource,
            action,
            granted,
            metadata: BTreeMap::new(),
        }
    }

    /// Event for `user` with role and organization metadata filled in.
    pub fn for_user(
        user: &UserWithRole,
        resource: ResourceType,
        action: ActionType,
        granted: bool,
    ) -> Self {
        let event = Self::new(user.id.as_str(), resource, action, granted)
            .with_metadata("role", user.role.id.as_str())
            .with_metadata("organization_id", user.organization_id.as_str());
        match &user.team_id {
            Some(team) => event.with_metadata("team_id", team.as_str()),
            None => event,
        }
    }

    /// Attach metadata. Values under sensitive keys are redacted here, before
    /// the event reaches any sink.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        let key = key.into();
        let value = SensitiveFieldRedactor::global().redact_json(&key, value.into());
        self.metadata.insert(key, value);
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

fn emit(event: &AuditEvent) {
    let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
    info!(
        target: "audit",
        user_id = %event.user_id,
        resource = %event.resource,
        action = %event.action,
        granted = event.granted,
        timestamp = %event.timestamp.to_rfc3339(),
        metadata = %metadata,
        "AUDIT"
    );
}

/// Writes events to the `audit` tracing target on the caller's thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        emit(&event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Bounded queue drained by a background task that logs each event.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Must be called inside a Tokio runtime.
    pub fn new(buffer: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(buffer.max(1));
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                emit(&event);
            }
        });
        Self { sender }
    }

    /// Sink whose events are delivered to the returned receiver instead of
    /// the log. Useful for forwarding to an external store.
    pub fn with_receiver(buffer: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                error!(
                    user_id = %event.user_id,
                    resource = %event.resource,
                    action = %event.action,
                    "Audit channel full, event dropped"
                );
                AuditDropCounter::increment("full");
            }
            Err(TrySendError::Closed(event)) => {
                error!(
                    user_id = %event.user_id,
                    resource = %event.resource,
                    action = %event.action,
                    "Audit channel closed, event dropped"
                );
                AuditDropCounter::increment("closed");
            }
        }
    }
}

/// Build the configured sink. Spawns the background writer when enabled.
pub fn sink_from_settings(settings: &AuditSettings) -> Arc<dyn AuditSink> {
    if settings.enabled {
        Arc::new(ChannelAuditSink::new(settings.buffer_size))
    } else {
        Arc::new(NoopAuditSink)
    }
}
