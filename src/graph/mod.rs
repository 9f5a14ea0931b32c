//! Core gravity graph data structures

mod edge;
mod event;
mod session;
mod track;

pub use edge::{Checkpoint, DeltaMap, Edge, EdgeKey};
pub use event::{Event, EventMeta, EventType};
pub use session::SessionState;
pub use track::TrackId;
