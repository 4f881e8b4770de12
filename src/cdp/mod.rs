//! Chrome DevTools Protocol plumbing
//!
//! Minimal hand-rolled client: WebSocket transport, typed command wrappers,
//! and the live-page backend built on them.

pub mod backend;
pub mod session;
pub mod transport;
pub mod types;

pub use backend::CdpBackend;
pub use session::{Connection, Session};
pub use transport::{launch_chrome, CdpEvent, Transport};
