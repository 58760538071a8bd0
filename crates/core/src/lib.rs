//! Core data types for the Sicc crypto alert bot.

pub mod asset;
pub mod format;
pub mod participant;

pub use asset::*;
pub use format::*;
pub use participant::*;
