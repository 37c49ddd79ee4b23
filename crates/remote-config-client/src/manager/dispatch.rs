//! Delivery of classified config changes to product handlers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::applied::{AppliedConfig, AppliedConfigTable, StatusCell};
use super::batch::TransactionOutcomes;
use super::handler::{Action, Ack, ProductHandler};

/// Borrowed view of the manager used for one dispatch pass.
pub(crate) struct Dispatcher<'a> {
    pub(crate) table: &'a mut AppliedConfigTable,
    pub(crate) handlers: &'a HashMap<String, ProductHandler>,
    /// Paths already claimed by batch handlers, with their verdicts.
    pub(crate) batch: &'a TransactionOutcomes,
}

impl Dispatcher<'_> {
    /// Mutates the table for every config, then hands each one to its handler.
    ///
    /// A failing handler only marks its own config; the loop always runs to
    /// the end of `configs`.
    pub(crate) fn dispatch(&mut self, configs: Vec<AppliedConfig>, action: Action) {
        for config in configs {
            match action {
                Action::Unapply => {
                    self.table.remove(&config.path);
                }
                Action::Apply | Action::Modify => {
                    self.table.insert(config.clone());
                }
            }

            if self.batch.handled.contains(&config.path) {
                if let Some(status) = self.batch.statuses.get(&config.path) {
                    config.status.set(status.clone());
                }
                continue;
            }

            let Some(handler) = self.handlers.get(&config.product) else {
                debug!(
                    path = %config.path,
                    product = %config.product,
                    "remote-config: no handler registered for product"
                );
                continue;
            };

            debug!(path = %config.path, %action, "remote-config: dispatching config");
            invoke(handler, action, config);
        }
    }
}

fn invoke(handler: &ProductHandler, action: Action, config: AppliedConfig) {
    let AppliedConfig {
        path,
        id,
        file,
        status,
        ..
    } = config;

    match handler {
        ProductHandler::Sync(handler) => {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler(action, file.as_ref(), &id)));
            let verdict = match outcome {
                Ok(result) => result.map_err(|err| err.to_string()),
                Err(payload) => Err(panic_message(payload)),
            };
            record(&path, action, &status, verdict);
        }
        ProductHandler::Ack(handler) => {
            let ack = Ack::new(path.clone(), status.clone());
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler(action, file.as_ref(), &id, ack)));
            if let Err(payload) = outcome {
                record(&path, action, &status, Err(panic_message(payload)));
            }
        }
        ProductHandler::Future(handler) => {
            let Ok(runtime) = Handle::try_current() else {
                record(
                    &path,
                    action,
                    &status,
                    Err("no async runtime available to run the handler".to_string()),
                );
                return;
            };
            let future = match panic::catch_unwind(AssertUnwindSafe(|| handler(action, file, id)))
            {
                Ok(future) => future,
                Err(payload) => {
                    record(&path, action, &status, Err(panic_message(payload)));
                    return;
                }
            };
            runtime.spawn(async move {
                let verdict = match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(result) => result.map_err(|err| err.to_string()),
                    Err(payload) => Err(panic_message(payload)),
                };
                record(&path, action, &status, verdict);
            });
        }
    }
}

fn record(path: &str, action: Action, status: &StatusCell, verdict: Result<(), String>) {
    if let Err(message) = &verdict {
        warn!(%path, %action, error = %message, "remote-config: handler failed");
    }
    status.resolve(verdict);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("handler panicked: {detail}")
}
