//! # TinyGKit Core
//!
//! Core types shared by the TinyGKit crates: error types, driver
//! configuration, decoded settings and the collaborator seam that receives
//! them, and the routed event channel.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod setting;

pub use config::DriverConfig;

pub use error::{ConnectionError, Error, ProtocolError, Result};

pub use event_bus::{
    EventBusError, EventDispatcher, EventFilter, EventKind, RoutingEvent, SubscriptionId,
};

pub use setting::{MachineModel, MemoryMachineModel, NoOpMachineModel, Setting, SettingGroup};
