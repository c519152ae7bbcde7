//! Client registry
//!
//! The ordered collection of active sessions, shared by the accept loop and
//! every client handler. All structural changes and every full traversal
//! (name lookup, privilege check, broadcast) happen under one exclusive
//! lock, obtained through [`Registry::lock`].
//!
//! Privilege is derived from order: whichever session is currently first
//! is the super-user. When it leaves, the next oldest session takes over.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::AppError;
use crate::message::Message;
use crate::session::{lock, Session};
use crate::types::SessionId;

/// Thread-safe ordered set of sessions
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the registry's critical section
    ///
    /// Use this when several lookups and a broadcast must happen without
    /// another handler interleaving.
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            sessions: lock(&self.sessions),
        }
    }

    /// Append a session, refusing duplicate names
    ///
    /// Returns the session's position (0 means privileged).
    pub fn register(&self, session: Arc<Session>) -> Result<usize, AppError> {
        self.lock().register(session)
    }

    /// Remove a session; later sessions move up one position
    pub fn unregister(&self, id: SessionId) -> Option<Arc<Session>> {
        self.lock().unregister(id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Session>> {
        self.lock().find_by_name(name)
    }

    pub fn position(&self, id: SessionId) -> Option<usize> {
        self.lock().position(id)
    }

    pub fn is_privileged(&self, id: SessionId) -> bool {
        self.lock().is_privileged(id)
    }

    /// Write a message to every ready session, returning how many got it
    pub fn broadcast(&self, message: &Message) -> usize {
        self.lock().broadcast(message)
    }

    /// Display names in registration order
    pub fn names(&self) -> Vec<String> {
        self.lock().names()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Close every registered session so blocked handlers return
    pub fn close_all(&self) {
        let guard = self.lock();
        for session in guard.sessions.iter() {
            debug!("Closing session {} on shutdown", session.name());
            session.close();
        }
    }
}

/// Exclusive access to the registry's sessions
pub struct RegistryGuard<'a> {
    sessions: MutexGuard<'a, Vec<Arc<Session>>>,
}

impl RegistryGuard<'_> {
    pub fn register(&mut self, session: Arc<Session>) -> Result<usize, AppError> {
        if self.find_by_name(session.name()).is_some() {
            return Err(AppError::NameTaken(session.name().to_string()));
        }
        self.sessions.push(session);
        Ok(self.sessions.len() - 1)
    }

    pub fn unregister(&mut self, id: SessionId) -> Option<Arc<Session>> {
        let position = self.position(id)?;
        Some(self.sessions.remove(position))
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions.iter().find(|s| s.name() == name).cloned()
    }

    pub fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }

    /// True if `id` is the first registered session
    pub fn is_privileged(&self, id: SessionId) -> bool {
        self.sessions.first().is_some_and(|s| s.id() == id)
    }

    pub fn broadcast(&self, message: &Message) -> usize {
        let mut delivered = 0;
        for session in self.sessions.iter() {
            if !session.is_ready() {
                warn!("Session {} not ready, skipping", session.name());
                continue;
            }
            match session.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to deliver message to {}: {}", session.name(), e),
            }
        }
        debug!(
            "Broadcast delivered to {}/{} sessions",
            delivered,
            self.sessions.len()
        );
        delivered
    }

    pub fn names(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
