//! # Event Dispatch Module
//!
//! Routes decoded protocol output to collaborators without tying the engine
//! to any UI toolkit.
//!
//! ## Overview
//!
//! Each driver owns one [`EventDispatcher`]:
//! - Publishers (parser, writer, watchdog) emit typed [`RoutingEvent`]s
//! - Synchronous handlers filter by [`EventKind`] and run on the publishing thread
//! - Async consumers take a broadcast receiver
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tinygkit_core::event_bus::{EventDispatcher, EventFilter, EventKind, RoutingEvent};
//!
//! let dispatcher = EventDispatcher::new(256);
//! let id = dispatcher.subscribe(
//!     EventFilter::Kinds(vec![EventKind::StatusReport]),
//!     |event| println!("{}", event.description()),
//! );
//! dispatcher.publish(RoutingEvent::StatusReport);
//! dispatcher.unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
