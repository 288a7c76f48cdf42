//! Registered sessions receiving browser events

use crate::session::{SessionHandle, SessionId};
use bridge_core::ChangeEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared map of live sessions
///
/// Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any handle with the same id
    pub fn register(&self, id: impl Into<SessionId>, handle: SessionHandle) -> Option<SessionHandle> {
        let id = id.into();
        debug!("Registering session {}", id);
        self.sessions.write().insert(id, handle)
    }

    /// Remove a session
    pub fn unregister(&self, id: &str) -> Option<SessionHandle> {
        debug!("Unregistering session {}", id);
        self.sessions.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    /// Ids of registered sessions, sorted
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Queue an event on every session; returns how many accepted it
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        let sessions = self.sessions.read();
        let mut delivered = 0;
        for (id, handle) in sessions.iter() {
            match handle.send_event(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Session {} dropped event: {}", id, e),
            }
        }
        delivered
    }
}
