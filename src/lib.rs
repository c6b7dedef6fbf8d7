pub mod models;
pub mod events;
pub mod error;
pub mod macros;
pub mod template;
pub mod dispatcher;
pub mod progress;
pub mod tracker;

pub use dispatcher::{Dispatcher, HttpDispatcher, LogDispatcher};
pub use error::{Result, VastError};
pub use events::{EventName, Listener, TrackerEvent, TrackingEvents};
pub use macros::{Macros, ResolvedMacros};
pub use models::{Ad, Creative, CreativeKind};
pub use tracker::{OverlayDuration, VastTracker};
