//! Kind-keyed handler registry.
//!
//! At most one handler is registered per message kind. Registering a kind
//! twice fails and leaves the existing handler untouched; a handler is only
//! replaced after an explicit `unregister`. The registry is bounded by a
//! capacity fixed at construction.
//!
//! `MessageHandler` uses RPITIT, so it cannot be a trait object directly.
//! Following the `BoxLlmProvider` pattern, `MessageHandlerDyn` is the
//! object-safe twin with a blanket impl, and `BoxHandler` wraps it.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::FutureExt;
use pagepilot_types::error::RouterError;
use serde_json::Value;
use tracing::{debug, warn};

/// Error type handlers may return. Anything implementing `std::error::Error`
/// (and plain strings) converts into it with `?` / `.into()`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of running a handler.
pub type HandlerResult = Result<Value, BoxError>;

/// Trait for handlers bound to one message kind.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MessageHandler: Send + Sync {
    /// Run the handler on a message payload.
    fn handle(&self, payload: Value) -> impl Future<Output = HandlerResult> + Send;

    /// Whether a content-role router forwards this handler's result to the
    /// background role. Query-style handlers answer locally.
    fn forwards(&self) -> bool {
        true
    }
}

/// Object-safe version of [`MessageHandler`] with boxed futures.
pub trait MessageHandlerDyn: Send + Sync {
    fn handle_boxed(&self, payload: Value) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>>;

    fn forwards(&self) -> bool;
}

impl<T: MessageHandler> MessageHandlerDyn for T {
    fn handle_boxed(&self, payload: Value) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>> {
        Box::pin(self.handle(payload))
    }

    fn forwards(&self) -> bool {
        MessageHandler::forwards(self)
    }
}

/// Type-erased, cheaply cloneable handler.
#[derive(Clone)]
pub struct BoxHandler {
    inner: Arc<dyn MessageHandlerDyn>,
}

impl BoxHandler {
    pub fn new<T: MessageHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    pub async fn handle(&self, payload: Value) -> HandlerResult {
        self.inner.handle_boxed(payload).await
    }

    pub fn forwards(&self) -> bool {
        self.inner.forwards()
    }
}

impl std::fmt::Debug for BoxHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxHandler")
            .field("forwards", &self.forwards())
            .finish()
    }
}

/// A handler built from an async closure.
pub struct FnHandler<F> {
    f: F,
    forwards: bool,
}

impl<F> FnHandler<F> {
    /// Answer locally even on a content-role router.
    pub fn local_only(mut self) -> Self {
        self.forwards = false;
        self
    }
}

impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    fn handle(&self, payload: Value) -> impl Future<Output = HandlerResult> + Send {
        (self.f)(payload)
    }

    fn forwards(&self) -> bool {
        self.forwards
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    FnHandler { f, forwards: true }
}

/// Wrap a synchronous closure as a handler.
pub fn sync_handler_fn<F>(
    f: F,
) -> FnHandler<impl Fn(Value) -> std::future::Ready<HandlerResult> + Send + Sync>
where
    F: Fn(Value) -> HandlerResult + Send + Sync,
{
    handler_fn(move |payload| std::future::ready(f(payload)))
}

/// Bounded registry mapping message kinds to handlers.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, BoxHandler>>,
    capacity: usize,
}

impl HandlerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Register `handler` for `kind`.
    ///
    /// Fails with `DuplicateHandler` if the kind is taken and with
    /// `CapacityExceeded` if the registry is full.
    pub fn register<H: MessageHandler + 'static>(
        &self,
        kind: impl Into<String>,
        handler: H,
    ) -> Result<(), RouterError> {
        let kind = kind.into();
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);

        if handlers.contains_key(&kind) {
            return Err(RouterError::DuplicateHandler(kind));
        }
        if handlers.len() >= self.capacity {
            return Err(RouterError::CapacityExceeded(self.capacity));
        }

        debug!(%kind, "registered message handler");
        handlers.insert(kind, BoxHandler::new(handler));
        Ok(())
    }

    /// Remove the handler for `kind`. Returns `true` if one was registered.
    pub fn unregister(&self, kind: &str) -> bool {
        let removed = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(kind)
            .is_some();
        if removed {
            debug!(%kind, "unregistered message handler");
        }
        removed
    }

    pub fn get(&self, kind: &str) -> Option<BoxHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    /// Run the handler registered for `kind`.
    ///
    /// A returned error and a panic (raised synchronously or while the
    /// future is polled) both become `HandlerExecution` carrying the
    /// original message.
    pub async fn dispatch(&self, kind: &str, payload: Value) -> Result<Value, RouterError> {
        let handler = self
            .get(kind)
            .ok_or_else(|| RouterError::HandlerNotFound(kind.to_string()))?;
        run_handler(kind, &handler, payload).await
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Run one handler, turning errors and panics into `HandlerExecution`.
pub(crate) async fn run_handler(
    kind: &str,
    handler: &BoxHandler,
    payload: Value,
) -> Result<Value, RouterError> {
    // The handler is invoked inside the async block so a synchronous panic
    // surfaces on the first poll, where catch_unwind sees it.
    let outcome = AssertUnwindSafe(async move { handler.handle(payload).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(%kind, error = %e, "handler returned an error");
            Err(RouterError::HandlerExecution {
                kind: kind.to_string(),
                message: e.to_string(),
            })
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(%kind, %message, "handler panicked");
            Err(RouterError::HandlerExecution {
                kind: kind.to_string(),
                message,
            })
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
