//! Data models for wire frames and presence rows.

pub mod event;
pub mod presence;

pub use event::*;
pub use presence::*;
