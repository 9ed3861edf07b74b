//! Shared types for the seat reservation workspace.

mod money;
mod types;

pub use money::Money;
pub use types::{ReservationId, ShowtimeId};
