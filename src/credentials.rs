//! Credential pool.
//!
//! Every composite script executes under exactly one credential. The pool hands
//! credentials out in rotation so that successive batches spread load over every
//! known token.

use crate::config::{CredentialConfig, CredentialMode};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    tokens: Vec<String>,
    known: HashSet<String>,
}

/// Known credentials, static or learned from incoming calls.
#[derive(Debug)]
pub struct CredentialPool {
    mode: CredentialMode,
    inner: RwLock<Inner>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Fixed set of credentials; [`append`](Self::append) is ignored.
    pub fn new_static<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = Inner::default();
        for token in tokens {
            let token = token.into();
            if inner.known.insert(token.clone()) {
                inner.tokens.push(token);
            }
        }
        Self {
            mode: CredentialMode::Static,
            inner: RwLock::new(inner),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Empty pool filled by [`append`](Self::append).
    pub fn new_lazy() -> Self {
        Self {
            mode: CredentialMode::Lazy,
            inner: RwLock::new(Inner::default()),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &CredentialConfig) -> Self {
        match config.mode {
            CredentialMode::Static => Self::new_static(config.tokens.iter().cloned()),
            CredentialMode::Lazy => Self::new_lazy(),
        }
    }

    pub fn mode(&self) -> CredentialMode {
        self.mode
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a credential. Returns `true` if it was not known before.
    pub fn append(&self, token: &str) -> bool {
        if self.mode == CredentialMode::Static {
            return false;
        }
        if self.read().known.contains(token) {
            return false;
        }
        let mut inner = self.write();
        if !inner.known.insert(token.to_string()) {
            return false;
        }
        inner.tokens.push(token.to_string());
        debug!(known = inner.tokens.len(), "learned new credential");
        true
    }

    /// Next credential in rotation, or `None` while the pool is empty.
    pub fn get(&self) -> Option<String> {
        let inner = self.read();
        if inner.tokens.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % inner.tokens.len();
        Some(inner.tokens[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.read().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, token: &str) -> bool {
        self.read().known.contains(token)
    }
}
