//! Domain-facing audit emission (§4.13).
//!
//! Replaces the teacher's actor-based `AuditAgent` mailbox with a directly
//! awaited, mutex-serialized chain seal: the same "events are sealed in
//! strict order" guarantee the actor gave, without requiring an actor
//! runtime. `AuditChain::seal` is not reentrant-safe across concurrent
//! callers, so every caller goes through the same `Mutex`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::chain::AuditChain;
use super::event::AuditEvent;
use super::storage::AuditStorage;
use crate::error::Result;

/// Accepts domain audit events, seals them into the hash chain, and
/// forwards the sealed event to durable storage when configured.
#[async_trait]
pub trait AuditEmitter: Send + Sync {
    async fn emit(&self, event: AuditEvent) -> Result<AuditEvent>;
}

/// The default `AuditEmitter`: a BLAKE3 hash chain guarded by a mutex, with
/// an optional durable backend. With no backend configured, sealed events
/// are retained in a bounded in-memory ring for inspection (tests, local
/// dev) but are not persisted across restarts.
pub struct ChainedAuditEmitter {
    chain: Mutex<AuditChain>,
    storage: Option<Arc<dyn AuditStorage>>,
    recent: Mutex<Vec<AuditEvent>>,
    recent_capacity: usize,
}

impl ChainedAuditEmitter {
    pub fn new(service_name: String, storage: Option<Arc<dyn AuditStorage>>) -> Self {
        Self {
            chain: Mutex::new(AuditChain::new(service_name)),
            storage,
            recent: Mutex::new(Vec::new()),
            recent_capacity: 256,
        }
    }

    /// Resume a chain from the latest event in durable storage, so a
    /// restarted process doesn't start a fresh genesis chain.
    pub async fn resume(service_name: String, storage: Arc<dyn AuditStorage>) -> Result<Self> {
        let chain = match storage.latest().await? {
            Some(event) => match event.hash {
                Some(hash) => AuditChain::resume(service_name, hash, event.sequence),
                None => AuditChain::new(service_name),
            },
            None => AuditChain::new(service_name),
        };
        Ok(Self {
            chain: Mutex::new(chain),
            storage: Some(storage),
            recent: Mutex::new(Vec::new()),
            recent_capacity: 256,
        })
    }

    /// The most recently emitted events still held in memory. Not a
    /// substitute for `AuditStorage::query_range` against durable backends.
    pub async fn recent(&self) -> Vec<AuditEvent> {
        self.recent.lock().await.clone()
    }
}

#[async_trait]
impl AuditEmitter for ChainedAuditEmitter {
    async fn emit(&self, event: AuditEvent) -> Result<AuditEvent> {
        let sealed = {
            let mut chain = self.chain.lock().await;
            chain.seal(event)
        };

        if let Some(storage) = &self.storage {
            storage.append(&sealed).await?;
        }

        let mut recent = self.recent.lock().await;
        recent.push(sealed.clone());
        if recent.len() > self.recent_capacity {
            let overflow = recent.len() - self.recent_capacity;
            recent.drain(0..overflow);
        }

        Ok(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{AuditEventKind, AuditSeverity};

    fn event(name: &str) -> AuditEvent {
        AuditEvent::new(
            AuditEventKind::Custom(name.to_string()),
            AuditSeverity::Informational,
            "control-plane-core".to_string(),
        )
    }

    #[tokio::test]
    async fn sealed_events_chain_sequentially() {
        let emitter = ChainedAuditEmitter::new("control-plane-core".to_string(), None);

        let first = emitter.emit(event("workspace.created")).await.unwrap();
        let second = emitter.emit(event("member.invited")).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.previous_hash.as_deref(), first.hash.as_deref());
    }

    #[tokio::test]
    async fn recent_ring_retains_emitted_events() {
        let emitter = ChainedAuditEmitter::new("control-plane-core".to_string(), None);
        emitter.emit(event("workspace.created")).await.unwrap();
        emitter.emit(event("member.invited")).await.unwrap();

        let recent = emitter.recent().await;
        assert_eq!(recent.len(), 2);
    }
}
