//! Registry for handlers.

use crate::catalog::Catalog;
use crate::error::{ConfigError, InitError};
use crate::handler::{Handler, HandlerSlot};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Registry of available handlers.
///
/// Handlers are kept in registration order, which is also the routing
/// tie-break order. Registration is append-only and happens before any
/// routing request is served.
pub struct Registry {
    slots: Vec<Arc<HandlerSlot>>,
    /// Slot index by handler name.
    names: IndexMap<String, usize>,
    catalog: Catalog,
    failure_epoch: Arc<AtomicU64>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.names.keys().collect::<Vec<_>>())
            .field("formats", &self.catalog.len())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            names: IndexMap::new(),
            catalog: Catalog::new(),
            failure_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a handler.
    pub fn register(&mut self, handler: impl Handler + 'static) -> Result<(), ConfigError> {
        self.register_shared(Arc::new(handler))
    }

    /// Register a handler the caller keeps a reference to.
    pub fn register_shared(&mut self, handler: Arc<dyn Handler>) -> Result<(), ConfigError> {
        let name = handler.name().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyHandlerName);
        }
        if self.names.contains_key(&name) {
            return Err(ConfigError::DuplicateHandler(name));
        }
        validate_formats(handler.as_ref()).map_err(|source| ConfigError::Handler {
            handler: name.clone(),
            source: Box::new(source),
        })?;

        for format in handler.supported_formats() {
            self.catalog.absorb(format);
        }

        tracing::debug!(
            handler = %name,
            formats = handler.supported_formats().len(),
            any_input = handler.supports_any_input(),
            "registered handler"
        );

        let slot = HandlerSlot::new(handler, Arc::clone(&self.failure_epoch));
        self.names.insert(name, self.slots.len());
        self.slots.push(Arc::new(slot));
        Ok(())
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<HandlerSlot>> {
        self.slots.iter()
    }

    /// Get a handler by registration index.
    pub fn slot(&self, index: usize) -> Option<&Arc<HandlerSlot>> {
        self.slots.get(index)
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<&Arc<HandlerSlot>> {
        self.names.get(name).and_then(|&idx| self.slots.get(idx))
    }

    /// Registration index of a handler.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Counter bumped every time a handler transitions to `Failed`.
    pub fn failure_epoch(&self) -> u64 {
        self.failure_epoch.load(Ordering::Acquire)
    }

    /// Probe every handler now, in registration order.
    pub fn initialize_all(&self) -> Vec<(String, Result<(), InitError>)> {
        self.slots
            .iter()
            .map(|slot| (slot.name().to_string(), slot.ensure_ready()))
            .collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn validate_formats(handler: &dyn Handler) -> Result<(), ConfigError> {
    let formats = handler.supported_formats();
    if formats.is_empty() {
        return Err(ConfigError::NoFormats {
            handler: handler.name().to_string(),
        });
    }

    let mut seen = HashSet::new();
    for format in formats {
        format.validate()?;
        if !seen.insert(format.internal_id.as_str()) {
            return Err(ConfigError::DuplicateFormat(format.internal_id.clone()));
        }
    }
    Ok(())
}
