//! WebSocket Session Management
//!
//! One tutoring session per connection:
//!
//! - `protocol`: the JSON message format for client-server communication.
//! - `session`: connection lifecycle, from `init` to teardown.
//! - `playback`: audio strategies that play on the client.

pub mod playback;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
