//! Product handler shapes.
//!
//! A handler is registered per product and is told about every config change
//! for that product. The shape is fixed at registration time:
//!
//! - [`ProductHandler::Sync`] returns its verdict directly;
//! - [`ProductHandler::Ack`] receives an [`Ack`] and may report later, from
//!   any thread, possibly after the next poll has started;
//! - [`ProductHandler::Future`] returns a future resolved on the runtime.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use super::applied::StatusCell;

/// Error type handlers report failures with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
/// Verdict returned by synchronous and future-based handlers.
pub type HandlerResult = Result<(), HandlerError>;

type SyncHandlerFn = dyn Fn(Action, Option<&Value>, &str) -> HandlerResult + Send + Sync;
type AckHandlerFn = dyn Fn(Action, Option<&Value>, &str, Ack) + Send + Sync;
type FutureHandlerFn =
    dyn Fn(Action, Option<Value>, String) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Kind of change being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Apply,
    Modify,
    Unapply,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Apply => "apply",
            Action::Modify => "modify",
            Action::Unapply => "unapply",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handler registered for one product.
///
/// Handlers receive the action, the decoded config file and the config id.
/// They must not call back into the manager that dispatched them.
#[derive(Clone)]
pub enum ProductHandler {
    Sync(Arc<SyncHandlerFn>),
    Ack(Arc<AckHandlerFn>),
    Future(Arc<FutureHandlerFn>),
}

impl ProductHandler {
    /// Wraps a handler that reports its verdict by returning.
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(Action, Option<&Value>, &str) -> HandlerResult + Send + Sync + 'static,
    {
        ProductHandler::Sync(Arc::new(handler))
    }

    /// Wraps a handler that reports its verdict through an [`Ack`].
    pub fn ack<F>(handler: F) -> Self
    where
        F: Fn(Action, Option<&Value>, &str, Ack) + Send + Sync + 'static,
    {
        ProductHandler::Ack(Arc::new(handler))
    }

    /// Wraps a handler whose verdict is the output of a future.
    pub fn future<F, Fut>(handler: F) -> Self
    where
        F: Fn(Action, Option<Value>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        ProductHandler::Future(Arc::new(move |action, file, id| {
            handler(action, file, id).boxed()
        }))
    }

    fn kind(&self) -> &'static str {
        match self {
            ProductHandler::Sync(_) => "sync",
            ProductHandler::Ack(_) => "ack",
            ProductHandler::Future(_) => "future",
        }
    }
}

impl fmt::Debug for ProductHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProductHandler").field(&self.kind()).finish()
    }
}

/// One-shot acknowledgement handle given to [`ProductHandler::Ack`] handlers.
///
/// Consuming `self` makes a second acknowledgement impossible. Dropping the
/// handle without acknowledging leaves the config unacknowledged.
#[must_use = "the config stays unacknowledged until the handle is used"]
pub struct Ack {
    path: String,
    status: StatusCell,
}

impl Ack {
    pub(crate) fn new(path: String, status: StatusCell) -> Self {
        Self { path, status }
    }

    /// Path of the config being acknowledged.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reports the handler verdict.
    pub fn ack(self, result: HandlerResult) {
        let recorded = self.status.resolve(result.map_err(|err| err.to_string()));
        if !recorded {
            tracing::debug!(
                path = %self.path,
                "remote-config: ignoring acknowledgement for an already resolved config"
            );
        }
    }

    /// Shorthand for `ack(Ok(()))`.
    pub fn success(self) {
        self.ack(Ok(()));
    }

    /// Shorthand for `ack(Err(error))`.
    pub fn error(self, error: impl Into<HandlerError>) {
        self.ack(Err(error.into()));
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack").field("path", &self.path).finish()
    }
}
