//! Connection hub: live client connections and filtered fan-out.

pub mod registry;
pub mod transport;

pub use registry::{BroadcastReport, Connection, ConnectionHub};
pub use transport::{Transport, WsTransport};
