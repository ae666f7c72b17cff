//! Live connections, keyed by id.
//!
//! Every registered store instance owns exactly one client behind an async
//! mutex. Callers get an `Arc` to the handle, so removing an entry never
//! pulls a client out from under an operation that is still running.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// One registered connection.
#[derive(Debug)]
pub struct ConnectionHandle<C> {
    id: String,
    client: Mutex<C>,
}

impl<C> ConnectionHandle<C> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &Mutex<C> {
        &self.client
    }
}

/// Thread-safe map from connection id to client handle.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    handles: RwLock<HashMap<String, Arc<ConnectionHandle<C>>>>,
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }
}

impl<C> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ConnectionHandle<C>>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Registers `client` under `id`, returning the handle it replaced.
    pub fn put(&self, id: impl Into<String>, client: C) -> Option<Arc<ConnectionHandle<C>>> {
        let id = id.into();
        let handle = Arc::new(ConnectionHandle {
            id: id.clone(),
            client: Mutex::new(client),
        });
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ConnectionHandle<C>>> {
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Removes `handle` only if it is still the one registered under its id,
    /// so a connection replaced in the meantime survives.
    pub fn remove_handle(&self, handle: &Arc<ConnectionHandle<C>>) -> bool {
        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        let is_current = handles
            .get(handle.id())
            .is_some_and(|current| Arc::ptr_eq(current, handle));
        if is_current {
            handles.remove(handle.id());
        }
        is_current
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
