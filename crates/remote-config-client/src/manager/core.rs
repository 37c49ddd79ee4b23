//! The synchronisation engine proper.
//!
//! [`RemoteConfigManager`] owns the applied-configuration table, the handler
//! registries and the committed sync state. It performs no I/O: callers build a
//! request with [`RemoteConfigManager::payload`], exchange it however they like
//! and feed the answer back through [`RemoteConfigManager::handle_poll_result`].
//! Poll cycles must be serialised by the caller (`&mut self` enforces it).

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use super::applied::{AppliedConfig, AppliedConfigTable};
use super::batch::{
    filter_by_products, BatchHandler, BatchHandlerId, TransactionOutcomes, UpdateTransaction,
};
use super::dispatch::Dispatcher;
use super::handler::{Action, ProductHandler};
use super::parser::{plan_update, ConfigUpdate, ParseError};
use super::state::{ClientIdentity, SyncState, ROOT_VERSION};
use crate::capabilities::{Capabilities, Capability};
use crate::config::ClientConfig;
use crate::protocol::{
    Client, ClientGetConfigsRequest, ClientGetConfigsResponse, ClientState, TargetFileMeta,
};
use crate::transport::{TransportError, TransportResponse};

/// Effect of a registry change on polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// The first product was subscribed: polling should start.
    Started,
    /// The last product was unsubscribed: polling should stop.
    Stopped,
    Unchanged,
}

/// What happened during one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The agent has Remote Config disabled (404).
    Disabled,
    /// Nothing new on the agent side.
    NotModified,
    /// A response body was parsed and dispatched.
    Updated,
    TransportFailed(String),
    ParseFailed(String),
}

/// Client-side Remote Configuration engine.
#[derive(Debug)]
pub struct RemoteConfigManager {
    identity: ClientIdentity,
    capabilities: Capabilities,
    products: Vec<String>,
    handlers: HashMap<String, ProductHandler>,
    batch_handlers: Vec<BatchHandler>,
    next_batch_id: u64,
    extra_services: Vec<String>,
    applied: AppliedConfigTable,
    sync: SyncState,
}

impl RemoteConfigManager {
    pub fn new(identity: ClientIdentity) -> Self {
        Self {
            identity,
            capabilities: Capabilities::new(),
            products: Vec::new(),
            handlers: HashMap::new(),
            batch_handlers: Vec::new(),
            next_batch_id: 0,
            extra_services: Vec::new(),
            applied: AppliedConfigTable::default(),
            sync: SyncState::default(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(ClientIdentity::from_config(config))
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn set_capability(&mut self, bit: u64, enabled: bool) {
        self.capabilities.set_capability(bit, enabled);
    }

    pub fn update_capability(&mut self, capability: Capability, enabled: bool) {
        self.capabilities.update(capability, enabled);
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Registers `handler` for `product`, replacing any previous one, and
    /// subscribes to the product.
    pub fn set_product_handler(
        &mut self,
        product: impl Into<String>,
        handler: ProductHandler,
    ) -> SubscriptionChange {
        let product = product.into();
        self.handlers.insert(product.clone(), handler);
        self.subscribe_products([product])
    }

    /// Drops the handler for `product` and unsubscribes from it.
    pub fn remove_product_handler(&mut self, product: &str) -> SubscriptionChange {
        self.handlers.remove(product);
        self.unsubscribe_products([product])
    }

    /// Adds products to the reported list, keeping insertion order.
    pub fn subscribe_products<I, S>(&mut self, products: I) -> SubscriptionChange
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let was_idle = self.products.is_empty();
        for product in products {
            let product = product.into();
            if !self.products.contains(&product) {
                self.products.push(product);
            }
        }
        if was_idle && !self.products.is_empty() {
            SubscriptionChange::Started
        } else {
            SubscriptionChange::Unchanged
        }
    }

    /// Removes products from the reported list. Handlers stay registered.
    pub fn unsubscribe_products<I, S>(&mut self, products: I) -> SubscriptionChange
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let was_active = !self.products.is_empty();
        for product in products {
            self.products.retain(|existing| existing != product.as_ref());
        }
        if was_active && self.products.is_empty() {
            SubscriptionChange::Stopped
        } else {
            SubscriptionChange::Unchanged
        }
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn has_product_handler(&self, product: &str) -> bool {
        self.handlers.contains_key(product)
    }

    /// Registers a handler that sees every change of `products` once per update.
    pub fn set_batch_handler<I, S, F>(&mut self, products: I, handler: F) -> BatchHandlerId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&mut UpdateTransaction<'_>) + Send + Sync + 'static,
    {
        self.next_batch_id += 1;
        let id = BatchHandlerId(self.next_batch_id);
        let products: HashSet<String> = products.into_iter().map(Into::into).collect();
        self.batch_handlers
            .push(BatchHandler::new(id, products, handler));
        id
    }

    /// Returns `false` when no batch handler had that id.
    pub fn remove_batch_handler(&mut self, id: BatchHandlerId) -> bool {
        let before = self.batch_handlers.len();
        self.batch_handlers.retain(|batch| batch.id != id);
        self.batch_handlers.len() != before
    }

    /// Sets the additional service names reported in the tracer block.
    pub fn set_extra_services(&mut self, services: Vec<String>) {
        self.extra_services = services;
    }

    pub fn applied_configs(&self) -> &AppliedConfigTable {
        &self.applied
    }

    pub fn applied_config(&self, path: &str) -> Option<&AppliedConfig> {
        self.applied.get(path)
    }

    /// State that the next request will report.
    pub fn client_state(&self) -> ClientState {
        ClientState {
            root_version: ROOT_VERSION,
            targets_version: self.sync.targets_version,
            config_states: self
                .applied
                .iter()
                .map(AppliedConfig::config_state)
                .collect(),
            has_error: self.sync.has_error,
            error: self.sync.error.clone(),
            backend_client_state: self.sync.backend_client_state.clone(),
        }
    }

    /// Metadata of every file this client already holds.
    pub fn cached_target_files(&self) -> Vec<TargetFileMeta> {
        self.applied
            .iter()
            .map(AppliedConfig::cached_target_file)
            .collect()
    }

    pub fn build_request(&self) -> ClientGetConfigsRequest {
        ClientGetConfigsRequest {
            client: Client {
                state: self.client_state(),
                id: self.identity.client_id.clone(),
                products: self.products.clone(),
                is_tracer: true,
                client_tracer: self.identity.client_tracer(&self.extra_services),
                capabilities: self.capabilities.encode(),
            },
            cached_target_files: self.cached_target_files(),
        }
    }

    /// Serialised request body for the next poll.
    pub fn payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.build_request())
    }

    /// Folds the transport answer of one poll into the engine.
    pub fn handle_poll_result(
        &mut self,
        result: Result<TransportResponse, TransportError>,
    ) -> PollOutcome {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "remote-config: could not send remote config request");
                return PollOutcome::TransportFailed(err.to_string());
            }
        };

        if response.is_disabled() {
            debug!("remote-config: agent has remote configuration disabled");
            return PollOutcome::Disabled;
        }

        // The previous error has been reported by the request that just succeeded.
        self.sync.clear_error();

        if response.is_not_modified() {
            return PollOutcome::NotModified;
        }

        let parsed = serde_json::from_slice::<ClientGetConfigsResponse>(&response.body)
            .map_err(ParseError::InvalidResponse)
            .and_then(|payload| self.parse_config(&payload));
        match parsed {
            Ok(()) => PollOutcome::Updated,
            Err(err) => {
                if matches!(err, ParseError::InvalidResponse(_)) {
                    self.record_parse_error(&err);
                }
                PollOutcome::ParseFailed(err.to_string())
            }
        }
    }

    /// Validates `response`, then dispatches unapply, apply and modify in order.
    ///
    /// On error nothing but the reported error flag changes.
    pub fn parse_config(&mut self, response: &ClientGetConfigsResponse) -> Result<(), ParseError> {
        match plan_update(&self.applied, response) {
            Ok(update) => {
                self.apply_update(update);
                Ok(())
            }
            Err(err) => {
                self.record_parse_error(&err);
                Err(err)
            }
        }
    }

    /// Hands `configs` to their product handlers, mutating the table first.
    pub fn dispatch(&mut self, configs: Vec<AppliedConfig>, action: Action) {
        if configs.is_empty() {
            return;
        }
        let outcomes = TransactionOutcomes::default();
        Dispatcher {
            table: &mut self.applied,
            handlers: &self.handlers,
            batch: &outcomes,
        }
        .dispatch(configs, action);
    }

    fn apply_update(&mut self, update: ConfigUpdate) {
        let outcomes = self.run_batch_handlers(&update);
        let ConfigUpdate {
            to_unapply,
            to_apply,
            to_modify,
            targets_version,
            backend_client_state,
        } = update;

        debug!(
            unapply = to_unapply.len(),
            apply = to_apply.len(),
            modify = to_modify.len(),
            "remote-config: applying update"
        );

        let mut dispatcher = Dispatcher {
            table: &mut self.applied,
            handlers: &self.handlers,
            batch: &outcomes,
        };
        dispatcher.dispatch(to_unapply, Action::Unapply);
        dispatcher.dispatch(to_apply, Action::Apply);
        dispatcher.dispatch(to_modify, Action::Modify);

        if let Some(version) = targets_version {
            self.sync
                .commit(version, backend_client_state.unwrap_or_default());
        }
    }

    fn run_batch_handlers(&self, update: &ConfigUpdate) -> TransactionOutcomes {
        let mut outcomes = TransactionOutcomes::default();
        if self.batch_handlers.is_empty() || update.has_no_changes() {
            return outcomes;
        }

        let describe =
            |configs: &[AppliedConfig]| configs.iter().map(AppliedConfig::descriptor).collect::<Vec<_>>();
        let to_unapply = describe(&update.to_unapply);
        let to_apply = describe(&update.to_apply);
        let to_modify = describe(&update.to_modify);

        for batch in &self.batch_handlers {
            let mut transaction = UpdateTransaction::new(
                filter_by_products(&to_unapply, &batch.products),
                filter_by_products(&to_apply, &batch.products),
                filter_by_products(&to_modify, &batch.products),
                &mut outcomes,
            );
            if transaction.is_empty() {
                continue;
            }
            let handler = &batch.handler;
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&mut transaction))).is_err() {
                warn!(id = batch.id.0, "remote-config: batch handler panicked");
            }
        }
        outcomes
    }

    fn record_parse_error(&mut self, err: &ParseError) {
        error!(error = %err, "remote-config: could not parse remote config response");
        self.sync.record_error(err.to_string());
    }
}
