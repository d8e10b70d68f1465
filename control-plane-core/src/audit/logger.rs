//! Audit logger — thin convenience wrapper around an [`AuditEmitter`]
//!
//! `AuditLogger` provides the ergonomic `log_auth`/`log_custom` helpers the
//! rest of the crate calls into, without every call site needing to build
//! an [`AuditEvent`] by hand.

use std::sync::Arc;

use super::config::AuditConfig;
use super::emitter::AuditEmitter;
use super::event::{AuditEvent, AuditEventKind, AuditSeverity, AuditSource};
use crate::error::Result;

/// Audit logger for emitting events to the audit trail.
#[derive(Clone)]
pub struct AuditLogger {
    emitter: Arc<dyn AuditEmitter>,
    service_name: String,
    config: AuditConfig,
}

impl AuditLogger {
    pub fn new(emitter: Arc<dyn AuditEmitter>, service_name: String, config: AuditConfig) -> Self {
        Self {
            emitter,
            service_name,
            config,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Log an audit event, returning the sealed event (hash chain fields
    /// populated) once the emitter has accepted it.
    pub async fn log(&self, event: AuditEvent) -> Result<AuditEvent> {
        self.emitter.emit(event).await
    }

    /// Log an auth event with source information.
    pub async fn log_auth(
        &self,
        kind: AuditEventKind,
        severity: AuditSeverity,
        source: AuditSource,
    ) -> Result<AuditEvent> {
        let event = AuditEvent::new(kind, severity, self.service_name.clone()).with_source(source);
        self.log(event).await
    }

    /// Log a custom event.
    pub async fn log_custom(
        &self,
        name: &str,
        severity: AuditSeverity,
        metadata: Option<serde_json::Value>,
    ) -> Result<AuditEvent> {
        let mut event = AuditEvent::new(
            AuditEventKind::Custom(name.to_string()),
            severity,
            self.service_name.clone(),
        );
        event.metadata = metadata;
        self.log(event).await
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}
