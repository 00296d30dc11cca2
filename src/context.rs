//! Process-wide shared services
//!
//! Services are registered once during startup, in dependency order, through
//! a [`SharedContextBuilder`]. [`SharedContextBuilder::ready`] freezes the
//! registry and runs every service's `ready` hook in registration order;
//! only then is the context handed out. [`SharedContext::close`] runs the
//! `close` hooks in exact reverse order.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, SvnError};

/// A service living in the [`SharedContext`]
#[async_trait]
pub trait Shared: Any + Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Called once after every service has been registered
    async fn ready(&self, _context: &SharedContext) -> Result<()> {
        Ok(())
    }

    /// Called once during shutdown, after every service registered later
    /// has been closed
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct Entry {
    type_id: TypeId,
    any: Arc<dyn Any + Send + Sync>,
    service: Arc<dyn Shared>,
}

/// Mutable registration phase
#[derive(Default)]
pub struct SharedContextBuilder {
    entries: Vec<Entry>,
}

impl SharedContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service; each concrete type may be registered once
    pub fn add<T: Shared>(&mut self, service: Arc<T>) -> Result<&mut Self> {
        let type_id = TypeId::of::<T>();
        if self.entries.iter().any(|e| e.type_id == type_id) {
            return Err(SvnError::Config {
                message: format!("Service {} registered twice", service.name()),
            });
        }
        tracing::debug!("Registered shared service {}", service.name());
        self.entries.push(Entry {
            type_id,
            any: service.clone(),
            service,
        });
        Ok(self)
    }

    /// Look up a service registered earlier, for wiring dependents
    pub fn get<T: Shared>(&self) -> Option<Arc<T>> {
        find(&self.entries, TypeId::of::<T>())
    }

    /// Freeze the registry and run the ready pass.
    ///
    /// If a service fails to become ready, everything registered so far is
    /// closed in reverse order and the error is returned.
    pub async fn ready(self) -> Result<Arc<SharedContext>> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.type_id, i))
            .collect();
        let context = Arc::new(SharedContext {
            entries: self.entries,
            index,
            closed: AtomicBool::new(false),
        });

        for entry in &context.entries {
            if let Err(e) = entry.service.ready(&context).await {
                tracing::error!("Service {} failed to start: {}", entry.service.name(), e);
                if let Err(close_error) = context.close().await {
                    tracing::warn!("Cleanup after failed startup: {}", close_error);
                }
                return Err(e);
            }
        }
        Ok(context)
    }
}

fn find<T: Shared>(entries: &[Entry], type_id: TypeId) -> Option<Arc<T>> {
    entries
        .iter()
        .find(|e| e.type_id == type_id)
        .and_then(|e| e.any.clone().downcast::<T>().ok())
}

/// Immutable registry of shared services
pub struct SharedContext {
    entries: Vec<Entry>,
    index: HashMap<TypeId, usize>,
    closed: AtomicBool,
}

impl SharedContext {
    pub fn get<T: Shared>(&self) -> Option<Arc<T>> {
        let i = *self.index.get(&TypeId::of::<T>())?;
        self.entries[i].any.clone().downcast::<T>().ok()
    }

    /// Like [`get`](Self::get) but fails with an internal error
    pub fn require<T: Shared>(&self) -> Result<Arc<T>> {
        self.get::<T>().ok_or_else(|| {
            SvnError::internal(format!(
                "Shared service {} is not registered",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Service names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.service.name()).collect()
    }

    /// Close every service in reverse registration order.
    ///
    /// Every service gets its close call even if an earlier one failed; the
    /// first error is returned. Later calls do nothing.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut first_error = None;
        for entry in self.entries.iter().rev() {
            tracing::debug!("Closing shared service {}", entry.service.name());
            if let Err(e) = entry.service.close().await {
                tracing::error!("Failed to close {}: {}", entry.service.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
