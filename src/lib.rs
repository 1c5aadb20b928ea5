//! History Lens library
//!
//! Inspect the revision history of a file: collapse revisions that changed
//! nothing, group the rest by date, diff any two (or three) editions and
//! keep a trail of what was looked at.

pub mod backend;
pub mod config;
pub mod constant;
pub mod diff;
pub mod error;
pub mod history;
pub mod messages;
pub mod progress;
pub mod session;
