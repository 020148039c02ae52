//! MSI Handler: Maritime Safety Information store and coordinator
//!
//! Keeps the ship's record of shore-issued safety warnings and decides which
//! of them matter right now.
//!
//! ## Architecture
//!
//! - **geo**: great-circle distance and route bounding boxes
//! - **store**: thread-safe message store with status flags, expiry and persistence
//! - **handler**: timer-driven coordinator (poll → expire → recompute) with
//!   event inputs for position, routes and user actions
//! - **shore** / **routes** / **clock**: collaborator seams

pub mod clock;
pub mod config;
pub mod console;
pub mod geo;
pub mod handler;
pub mod routes;
pub mod shore;
pub mod store;
pub mod types;

pub use config::MsiSettings;

pub use types::{
    MessageId, MessagePriority, MessageView, Position, Route, RouteId, SafetyMessage, SequenceNumber,
};

pub use store::{MessageStatus, MessageStore, StoreError};

pub use handler::{LinkHealth, LinkStatus, ListenerId, MsiHandler};

pub use shore::{FileShoreClient, PollError, PollResult, ShoreClient};

pub use routes::{InMemoryRoutes, RouteEvent, RouteSource};

pub use clock::{Clock, ManualClock, SystemClock};
