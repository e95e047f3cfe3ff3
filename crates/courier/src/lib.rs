//! # Courier
//!
//! Object-level publish/subscribe with a bridge onto a channel/topic message
//! bus. This crate provides the building blocks for objects that emit named
//! events, listen to each other, and declare how their local events map onto
//! bus messages.
//!
//! ## Key Features
//!
//! - **Event Emitter**: Named events, space-separated names, `"all"` catch-alls and one-shot handlers
//! - **Inverted Listening**: `listen_to` / `stop_listening` with bookkeeping on both sides
//! - **Bus Adapter**: Channel/topic publish, disposable subscriptions and wiretaps
//! - **Declarative Messaging**: Message and subscription maps wired up by `configure_messaging`
//!
//! ## Architecture
//!
//! - **EventEmitter**: Per-object handler registry plus listening relations
//! - **Bus**: Handle to a [`Transport`], injected into every messenger
//! - **Messenger**: Trait that configures, rebuilds and tears down bus bindings
//!
//! ## Usage Examples
//!
//! ### Local events
//!
//! ```rust
//! use courier::*;
//! use serde_json::json;
//!
//! let door = EventEmitter::new();
//! door.on("open close", Callback::new(|args| println!("door: {:?}", args)), None);
//! door.trigger("open", &[json!({"by": "chef"})]);
//! ```
//!
//! ### Bridging events onto the bus
//!
//! ```rust
//! use courier::*;
//! use serde_json::json;
//!
//! struct Chef {
//!     emitter: EventEmitter,
//!     messaging: Messaging,
//! }
//!
//! impl Events for Chef {
//!     fn emitter(&self) -> &EventEmitter {
//!         &self.emitter
//!     }
//! }
//!
//! impl Messenger for Chef {
//!     fn messaging(&self) -> &Messaging {
//!         &self.messaging
//!     }
//!
//!     fn channel_name(&self) -> &str {
//!         "Kitchen"
//!     }
//!
//!     fn messages(&self) -> MessageMap {
//!         let mut messages = MessageMap::new();
//!         messages.insert(
//!             "orderReady".to_string(),
//!             MessageSpec::parse("Kitchen order.ready").unwrap(),
//!         );
//!         messages
//!     }
//! }
//!
//! let bus = Bus::local();
//! let chef = Chef {
//!     emitter: EventEmitter::new(),
//!     messaging: Messaging::new(bus.clone()),
//! };
//! chef.configure_messaging();
//! chef.trigger("orderReady", &[json!({"dish": "fries"})]);
//! ```

pub mod bus;
pub mod callback;
pub mod emitter;
pub mod error;
pub mod listening;
pub mod messenger;
pub mod spec;
pub mod transport;
pub mod utils;

// Re-exports for convenience
pub use bus::{Bus, Channel, Envelope, Subscription, Wiretap};
pub use callback::{Accessor, Callback, MessageCallback};
pub use emitter::{EmitterId, EventEmitter, Events};
pub use error::CourierError;
pub use listening::Listening;
pub use messenger::{Lifecycle, Messaging, Messenger, WiretapOptions};
pub use spec::{
    MessageMap, MessageSpec, MessagingConfig, OneOrMany, Route, SubscriptionMap,
    SubscriptionSpec, TopicRef,
};
pub use transport::{LocalTransport, SubscriptionId, Transport, WiretapFn, WiretapId};

/// Version information
pub const COURIER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, CourierError>;
