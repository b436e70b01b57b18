// crates/babel-hub/src/lib.rs
//
// babel-hub: Real-time event distribution for the Babel Protocol.
//
// One control loop owns the client set. Registrations, removals, liveness
// acknowledgments, and event dispatch all arrive as commands on a single
// channel, so the client set is never mutated concurrently and dispatch never
// waits on a subscriber: a client whose buffer is full is disconnected.

pub mod hub;
pub mod subscription;

use std::time::Duration;

pub use hub::{EventHub, HubConfig, HubHandle};
pub use subscription::{Outbound, Subscription};

/// How often every client is probed.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// How long a client may go without acknowledging before it is dropped.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Default per-client outbound buffer.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// Default capacity of the hub's command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 1024;
