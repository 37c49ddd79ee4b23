//! Remote configuration engine facade.
//!
//! Re-exports the engine together with the types handlers and embedders need:
//! the applied table, handler shapes, batch transactions and parse errors.

pub(crate) mod applied;
pub(crate) mod batch;
mod core;
pub(crate) mod dispatch;
pub(crate) mod handler;
pub(crate) mod parser;
pub(crate) mod state;
#[cfg(test)]
pub(crate) mod test_support;

pub use applied::{AppliedConfig, AppliedConfigTable, ApplyStatus, ConfigDescriptor};
pub use batch::{BatchHandlerId, UpdateTransaction};
pub use self::core::*;
pub use handler::{Ack, Action, HandlerError, HandlerResult, ProductHandler};
pub use parser::{plan_update, ConfigUpdate, ParseError};
pub use state::{ClientIdentity, ROOT_VERSION};
