//! Async client tying the engine, the transport and the scheduler together.
//!
//! The engine lives behind a mutex that is only held while building the
//! request and while folding the response back in, never across the network
//! exchange. Product registration drives the scheduler: the first
//! subscription starts polling and the last unsubscription stops it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, error};

use crate::capabilities::Capability;
use crate::config::ClientConfig;
use crate::manager::{
    BatchHandlerId, ClientIdentity, PollOutcome, ProductHandler, RemoteConfigManager,
    SubscriptionChange, UpdateTransaction,
};
use crate::protocol::ClientState;
use crate::scheduler::Scheduler;
use crate::status::RemoteConfigStatus;
use crate::transport::{HttpTransport, Transport, TransportError, DEFAULT_REQUEST_TIMEOUT};

/// Cloneable handle to a polling Remote Config client.
#[derive(Clone)]
pub struct RemoteConfigClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    enabled: bool,
    manager: Mutex<RemoteConfigManager>,
    transport: Arc<dyn Transport>,
    status: Arc<RemoteConfigStatus>,
    scheduler: Scheduler,
    shut_down: AtomicBool,
    // Serialises manual polls with scheduled ones.
    poll_gate: tokio::sync::Mutex<()>,
}

impl RemoteConfigClient {
    /// Builds a client polling the agent described by `config` over HTTP.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.agent_url, DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::with_transport(
            ClientIdentity::from_config(config),
            Arc::new(transport),
            config.poll_interval,
            config.enabled,
        ))
    }

    /// Builds a client around any [`Transport`].
    ///
    /// A disabled client accepts registrations but never starts polling.
    pub fn with_transport(
        identity: ClientIdentity,
        transport: Arc<dyn Transport>,
        poll_interval: Duration,
        enabled: bool,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let weak = weak.clone();
            let scheduler = Scheduler::new(poll_interval, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.poll().await;
                    }
                }
            });
            ClientInner {
                enabled,
                manager: Mutex::new(RemoteConfigManager::new(identity)),
                transport,
                status: RemoteConfigStatus::new(),
                scheduler,
                shut_down: AtomicBool::new(false),
                poll_gate: tokio::sync::Mutex::new(()),
            }
        });
        Self { inner }
    }

    /// Runs one poll cycle now.
    pub async fn poll(&self) -> PollOutcome {
        self.inner.poll().await
    }

    /// Registers `handler` for `product` and subscribes to it.
    ///
    /// The first subscription starts polling on the current tokio runtime.
    /// Outside a runtime polling is deferred to the next registration made
    /// inside one.
    pub fn set_product_handler(&self, product: impl Into<String>, handler: ProductHandler) {
        let change = self.inner.manager().set_product_handler(product, handler);
        self.inner.apply_subscription_change(change);
    }

    pub fn remove_product_handler(&self, product: &str) {
        let change = self.inner.manager().remove_product_handler(product);
        self.inner.apply_subscription_change(change);
    }

    pub fn subscribe_products<I, S>(&self, products: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let change = self.inner.manager().subscribe_products(products);
        self.inner.apply_subscription_change(change);
    }

    pub fn unsubscribe_products<I, S>(&self, products: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let change = self.inner.manager().unsubscribe_products(products);
        self.inner.apply_subscription_change(change);
    }

    pub fn set_batch_handler<I, S, F>(&self, products: I, handler: F) -> BatchHandlerId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&mut UpdateTransaction<'_>) + Send + Sync + 'static,
    {
        self.inner.manager().set_batch_handler(products, handler)
    }

    pub fn remove_batch_handler(&self, id: BatchHandlerId) -> bool {
        self.inner.manager().remove_batch_handler(id)
    }

    pub fn set_capability(&self, bit: u64, enabled: bool) {
        self.inner.manager().set_capability(bit, enabled);
    }

    pub fn update_capability(&self, capability: Capability, enabled: bool) {
        self.inner.manager().update_capability(capability, enabled);
    }

    pub fn set_extra_services(&self, services: Vec<String>) {
        self.inner.manager().set_extra_services(services);
    }

    /// State the next request will report.
    pub fn client_state(&self) -> ClientState {
        self.inner.manager().client_state()
    }

    /// Runs `f` with exclusive access to the engine.
    ///
    /// `f` must not call back into this client.
    pub fn with_manager<R>(&self, f: impl FnOnce(&mut RemoteConfigManager) -> R) -> R {
        f(&mut self.inner.manager())
    }

    pub fn status(&self) -> Arc<RemoteConfigStatus> {
        Arc::clone(&self.inner.status)
    }

    pub fn is_polling(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    /// Stops polling for good. A poll already in flight still completes and
    /// manual [`poll`](Self::poll) calls keep working.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.scheduler.stop();
    }
}

impl std::fmt::Debug for RemoteConfigClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfigClient")
            .field("enabled", &self.inner.enabled)
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl ClientInner {
    fn manager(&self) -> MutexGuard<'_, RemoteConfigManager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_subscription_change(&self, change: SubscriptionChange) {
        match change {
            SubscriptionChange::Stopped => {
                self.scheduler.stop();
            }
            SubscriptionChange::Started if !self.enabled => {
                debug!("remote-config: remote configuration disabled, not polling");
            }
            SubscriptionChange::Started => {
                self.start_polling();
            }
            // Picks up a start refused earlier for lack of a runtime.
            SubscriptionChange::Unchanged => {
                if self.enabled
                    && !self.scheduler.is_running()
                    && !self.manager().products().is_empty()
                {
                    self.start_polling();
                }
            }
        }
    }

    fn start_polling(&self) {
        if self.shut_down.load(Ordering::SeqCst) {
            debug!("remote-config: client shut down, not polling");
            return;
        }
        if !self.scheduler.start() && !self.scheduler.is_running() {
            debug!("remote-config: polling deferred until a registration inside a tokio runtime");
        }
    }

    async fn poll(&self) -> PollOutcome {
        let _gate = self.poll_gate.lock().await;

        let payload = self.manager().payload();
        let outcome = match payload {
            Ok(payload) => {
                let result = self.transport.send(payload).await;
                let outcome = self.manager().handle_poll_result(result);
                outcome
            }
            Err(err) => {
                error!(error = %err, "remote-config: could not serialize client state");
                PollOutcome::TransportFailed(err.to_string())
            }
        };
        self.status.record(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{AppliedConfig, HandlerResult};
    use crate::protocol::{ApplyState, ClientGetConfigsRequest};
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use base64::Engine;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    const PATH: &str = "datadog/2/APM_TRACING/sampling/config";

    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        requests: Mutex<Vec<ClientGetConfigsRequest>>,
    }

    impl ScriptedTransport {
        fn push(&self, response: Result<TransportResponse, TransportError>) {
            self.responses.lock().expect("lock").push_back(response);
        }

        fn requests(&self) -> Vec<ClientGetConfigsRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, payload: Vec<u8>) -> Result<TransportResponse, TransportError> {
            let request = serde_json::from_slice(&payload).expect("valid request");
            self.requests.lock().expect("lock").push(request);
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Ok(TransportResponse::ok(Vec::new())))
        }
    }

    fn sampling_response(hash: &str, rate: f64) -> TransportResponse {
        let engine = base64::engine::general_purpose::STANDARD;
        let targets = json!({
            "signed": {
                "version": 3,
                "custom": { "opaque_backend_state": "state" },
                "targets": {
                    PATH: { "length": 10, "hashes": { "sha256": hash }, "custom": { "v": 1 } }
                }
            }
        });
        let body = json!({
            "client_configs": [PATH],
            "targets": engine.encode(targets.to_string()),
            "target_files": [{
                "path": PATH,
                "raw": engine.encode(json!({ "sample_rate": rate }).to_string())
            }]
        });
        TransportResponse::ok(body.to_string().into_bytes())
    }

    fn client_with(transport: Arc<ScriptedTransport>) -> RemoteConfigClient {
        RemoteConfigClient::with_transport(
            ClientIdentity::default(),
            transport,
            Duration::from_secs(5),
            true,
        )
    }

    #[tokio::test]
    async fn poll_round_trip_applies_and_reports() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Ok(sampling_response("h1", 0.5)));
        let client = client_with(Arc::clone(&transport));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        client.with_manager(|manager| {
            manager.set_product_handler(
                "APM_TRACING",
                ProductHandler::sync(move |_, file, _| -> HandlerResult {
                    assert_eq!(file, Some(&json!({ "sample_rate": 0.5 })));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        });

        assert_eq!(client.poll().await, PollOutcome::Updated);
        assert_eq!(client.poll().await, PollOutcome::NotModified);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].client.state.targets_version, 0);
        assert!(requests[0].cached_target_files.is_empty());
        assert_eq!(requests[1].client.state.targets_version, 3);
        assert_eq!(requests[1].client.state.backend_client_state, "state");
        assert_eq!(
            requests[1].client.state.config_states[0].apply_state,
            ApplyState::Acknowledged
        );
        assert_eq!(requests[1].cached_target_files[0].path, PATH);

        let snapshot = client.status().snapshot();
        assert_eq!(snapshot.polls, 2);
        assert_eq!(snapshot.updates, 1);
    }

    #[tokio::test]
    async fn transport_failures_are_only_counted() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(TransportError::Status {
            status: 503,
            body: "unavailable".into(),
        }));
        let client = client_with(Arc::clone(&transport));

        assert!(matches!(client.poll().await, PollOutcome::TransportFailed(_)));
        assert!(!client.client_state().has_error);
        assert_eq!(client.status().snapshot().transport_errors, 1);
        assert_eq!(
            client.status().last_error().as_deref(),
            Some("unexpected status 503: unavailable")
        );
    }

    #[tokio::test]
    async fn parse_errors_are_reported_on_the_next_request() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Ok(TransportResponse::ok(b"not json".to_vec())));
        let client = client_with(Arc::clone(&transport));

        assert!(matches!(client.poll().await, PollOutcome::ParseFailed(_)));
        client.poll().await;
        client.poll().await;

        let requests = transport.requests();
        assert!(!requests[0].client.state.has_error);
        assert!(requests[1].client.state.has_error);
        assert!(!requests[1].client.state.error.is_empty());
        assert!(!requests[2].client.state.has_error);
    }

    #[tokio::test(start_paused = true)]
    async fn registration_drives_the_scheduler() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client_with(Arc::clone(&transport));
        assert!(!client.is_polling());

        client.set_product_handler("ASM_FEATURES", ProductHandler::sync(|_, _, _| Ok(())));
        client.subscribe_products(["ASM_DATA"]);
        assert!(client.is_polling());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(
            transport.requests()[0].client.products,
            vec!["ASM_FEATURES".to_string(), "ASM_DATA".to_string()]
        );

        client.remove_product_handler("ASM_FEATURES");
        assert!(client.is_polling());
        client.unsubscribe_products(["ASM_DATA"]);
        assert!(!client.is_polling());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn disabled_client_never_polls() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = RemoteConfigClient::with_transport(
            ClientIdentity::default(),
            transport,
            Duration::from_secs(1),
            false,
        );
        client.set_product_handler("ASM_FEATURES", ProductHandler::sync(|_, _, _| Ok(())));
        assert!(!client.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_client_stops_polling() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client_with(Arc::clone(&transport));
        client.subscribe_products(["ASM_DD"]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(client);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn registration_outside_a_runtime_starts_polling_later() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client_with(transport);
        client.set_product_handler("ASM_FEATURES", ProductHandler::sync(|_, _, _| Ok(())));
        assert!(!client.is_polling());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        let _entered = runtime.enter();
        client.subscribe_products(["ASM_DATA"]);
        assert!(client.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_final() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client_with(Arc::clone(&transport));
        client.subscribe_products(["ASM_DD"]);
        client.shutdown();
        assert!(!client.is_polling());

        client.subscribe_products(["ASM_DATA"]);
        client.unsubscribe_products(["ASM_DD", "ASM_DATA"]);
        client.subscribe_products(["ASM_FEATURES"]);
        assert!(!client.is_polling());
    }

    #[tokio::test]
    async fn modified_config_replaces_the_applied_entry() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Ok(sampling_response("h1", 0.5)));
        transport.push(Ok(sampling_response("h2", 0.1)));
        let client = client_with(Arc::clone(&transport));
        client.subscribe_products(["APM_TRACING"]);
        client.shutdown();

        client.poll().await;
        client.poll().await;
        let file = client.with_manager(|manager| {
            manager
                .applied_config(PATH)
                .and_then(|config: &AppliedConfig| config.file.clone())
        });
        assert_eq!(file, Some(json!({ "sample_rate": 0.1 })));
    }
}
