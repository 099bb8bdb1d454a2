//! Command dispatch.
//!
//! Re-exports the dispatcher, the handler trait and the detached task
//! registry.

pub mod dispatcher;
pub mod tasks;

pub use dispatcher::{CommandDispatcher, CommandHandler, DispatchMode, CLIENT_ID_HEADER};
pub use tasks::TaskRegistry;
