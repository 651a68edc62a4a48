//! Service layer for the room service.
//!
//! # Components
//!
//! - `coordinator` - Sequences lookups, policy checks and commits per request
//! - `lifecycle` - Room creation, ending, settings and history
//! - `ledger` - Membership transitions and the resolved read model
//! - `codes` - Room code generation

pub mod codes;
pub mod coordinator;
pub mod ledger;
pub mod lifecycle;

pub use codes::{RandomRoomCodes, RoomCodeSource};
pub use coordinator::{CoordinatorSettings, RoomCoordinator};
pub use ledger::MembershipLedger;
pub use lifecycle::RoomLifecycle;
