//! HTTP request handlers for the room service.

pub mod health;
pub mod metrics;
pub mod rooms;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use rooms::{
    create_room, end_room, get_history, get_room, join_room, leave_room, purge_history,
    set_participant_role, update_settings,
};
