//! On-disk state that must survive restarts
//!
//! - `queue`: pending wire records, one per line
//! - `prefs`: small key/value store (device identity lives here)

pub mod prefs;
pub mod queue;

pub use prefs::Preferences;
pub use queue::DurableQueue;

/// Queue file name inside the data directory
pub const QUEUE_FILE: &str = "pending_posts.txt";

/// Preference store file name inside the data directory
pub const PREFS_FILE: &str = "prefs.toml";
