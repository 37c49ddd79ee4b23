//! Batch handlers observing a whole update at once.
//!
//! Some consumers need every change across several products before they can
//! reconcile (e.g. a rule engine spanning multiple products). A batch handler
//! sees a product-filtered view of the update before per-product dispatch and
//! may claim paths: claimed paths are not dispatched to per-product handlers,
//! and an explicit `ack`/`error` sets their apply status.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::applied::{ApplyStatus, ConfigDescriptor};
use super::handler::HandlerError;

type BatchHandlerFn = dyn Fn(&mut UpdateTransaction<'_>) + Send + Sync;

/// Identifier returned when registering a batch handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchHandlerId(pub(crate) u64);

#[derive(Clone)]
pub(crate) struct BatchHandler {
    pub(crate) id: BatchHandlerId,
    pub(crate) products: HashSet<String>,
    pub(crate) handler: Arc<BatchHandlerFn>,
}

impl BatchHandler {
    pub(crate) fn new<F>(id: BatchHandlerId, products: HashSet<String>, handler: F) -> Self
    where
        F: Fn(&mut UpdateTransaction<'_>) + Send + Sync + 'static,
    {
        Self {
            id,
            products,
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for BatchHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandler")
            .field("id", &self.id)
            .field("products", &self.products)
            .finish()
    }
}

/// Outcomes collected from every batch handler of one update.
#[derive(Debug, Default)]
pub(crate) struct TransactionOutcomes {
    pub(crate) handled: HashSet<String>,
    pub(crate) statuses: HashMap<String, ApplyStatus>,
}

/// Product-filtered view of one update handed to a batch handler.
pub struct UpdateTransaction<'a> {
    pub to_unapply: Vec<ConfigDescriptor>,
    pub to_apply: Vec<ConfigDescriptor>,
    pub to_modify: Vec<ConfigDescriptor>,
    outcomes: &'a mut TransactionOutcomes,
}

impl<'a> UpdateTransaction<'a> {
    pub(crate) fn new(
        to_unapply: Vec<ConfigDescriptor>,
        to_apply: Vec<ConfigDescriptor>,
        to_modify: Vec<ConfigDescriptor>,
        outcomes: &'a mut TransactionOutcomes,
    ) -> Self {
        Self {
            to_unapply,
            to_apply,
            to_modify,
            outcomes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_unapply.is_empty() && self.to_apply.is_empty() && self.to_modify.is_empty()
    }

    /// Claims `path` without deciding its apply status.
    pub fn mark_handled(&mut self, path: &str) {
        self.outcomes.handled.insert(path.to_string());
    }

    /// Claims `path` and marks it acknowledged.
    pub fn ack(&mut self, path: &str) {
        self.outcomes
            .statuses
            .insert(path.to_string(), ApplyStatus::acknowledged());
        self.mark_handled(path);
    }

    /// Claims `path` and marks it failed.
    pub fn error(&mut self, path: &str, error: impl Into<HandlerError>) {
        let error: HandlerError = error.into();
        self.outcomes
            .statuses
            .insert(path.to_string(), ApplyStatus::error(error.to_string()));
        self.mark_handled(path);
    }
}

impl fmt::Debug for UpdateTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateTransaction")
            .field("to_unapply", &self.to_unapply)
            .field("to_apply", &self.to_apply)
            .field("to_modify", &self.to_modify)
            .finish()
    }
}

/// Keeps only the descriptors whose product the handler asked for.
pub(crate) fn filter_by_products(
    descriptors: &[ConfigDescriptor],
    products: &HashSet<String>,
) -> Vec<ConfigDescriptor> {
    descriptors
        .iter()
        .filter(|descriptor| products.contains(&descriptor.product))
        .cloned()
        .collect()
}
