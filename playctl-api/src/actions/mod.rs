//! Action registry
//!
//! Name → handler table consulted by both transports. Handlers are
//! asynchronous (they return a boxed future) so they may call into the
//! engine or other services. Registration is dynamic: code embedding the
//! service can add and remove actions at runtime.
//!
//! `subscribe` and `unsubscribe` are connection-level requests handled by
//! the WebSocket layer; they never appear in this table.

pub mod builtin;

use futures::future::BoxFuture;
use futures::FutureExt;
use playctl_common::{ActionInvocation, ActionResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, warn};

pub use builtin::ParamSpec;

/// Type-erased action handler
pub type ActionHandler =
    Arc<dyn Fn(ActionInvocation) -> BoxFuture<'static, ActionResult> + Send + Sync>;

struct Entry {
    id: u64,
    handler: ActionHandler,
}

/// Table of registered actions
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Entry>>,
    next_id: AtomicU64,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            actions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register an asynchronous handler under `name`.
    ///
    /// An existing action with the same name is replaced (with a warning).
    /// The returned [`Registration`] removes this handler again.
    pub fn register<F, Fut>(self: &Arc<Self>, name: impl Into<String>, handler: F) -> Registration
    where
        F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let handler: ActionHandler = Arc::new(move |invocation| handler(invocation).boxed());
        self.insert(name.into(), handler)
    }

    /// Register a synchronous handler under `name`
    pub fn register_fn<F>(self: &Arc<Self>, name: impl Into<String>, handler: F) -> Registration
    where
        F: Fn(ActionInvocation) -> ActionResult + Send + Sync + 'static,
    {
        let handler: ActionHandler = Arc::new(move |invocation| {
            let result = handler(invocation);
            async move { result }.boxed()
        });
        self.insert(name.into(), handler)
    }

    fn insert(self: &Arc<Self>, name: String, handler: ActionHandler) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if actions.insert(name.clone(), Entry { id, handler }).is_some() {
            warn!("Action \"{}\" already exists, overwriting", name);
        } else {
            debug!("Registered action \"{}\"", name);
        }

        Registration {
            registry: Arc::downgrade(self),
            name,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.actions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }

    /// Registered action names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .actions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Run the handler registered for `invocation.action`.
    ///
    /// Returns `None` when no handler exists; the caller then falls back to
    /// engine delegation. The table lock is released before the handler runs.
    pub async fn dispatch(&self, invocation: &ActionInvocation) -> Option<ActionResult> {
        let handler = {
            let actions = self
                .actions
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(&actions.get(&invocation.action)?.handler)
        };
        Some(handler(invocation.clone()).await)
    }

    fn remove(&self, name: &str, id: u64) -> bool {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match actions.get(name) {
            Some(entry) if entry.id == id => {
                actions.remove(name);
                debug!("Unregistered action \"{}\"", name);
                true
            }
            _ => false,
        }
    }
}

/// Handle returned by [`ActionRegistry::register`].
///
/// Dropping it does not unregister; call [`Registration::unregister`].
pub struct Registration {
    registry: Weak<ActionRegistry>,
    name: String,
    id: u64,
    active: AtomicBool,
}

impl Registration {
    /// Action name this handle was created for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the handler installed by this registration.
    ///
    /// Only the first call has an effect. If the name has since been
    /// registered again, the newer handler is left in place. Returns whether
    /// an entry was removed.
    pub fn unregister(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.name, self.id),
            None => false,
        }
    }
}
