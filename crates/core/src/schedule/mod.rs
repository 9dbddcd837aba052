//! Session view-models and the projector that builds them from local data.

mod model;
mod projector;
mod timecalc;

pub use model::MovieSession;
pub use projector::{project_sessions, ScheduleJoin};
pub use timecalc::{add_minutes, parse_duration_minutes, parse_embedded_seconds};
