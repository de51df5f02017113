//! Small helpers shared by the relay and the HTTP boundary.

pub mod status_text;
pub mod timing;

pub use status_text::status_text;
pub use timing::RelayTiming;
