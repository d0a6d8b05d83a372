//! Pure, synchronous session state for the ccmon daemon.
//!
//! Nothing in this crate performs I/O or reads the clock: every mutating
//! operation takes `now` from the caller, and observers are notified through
//! [`ChangeListener`].

pub mod change;
pub mod error;
pub mod event_log;
pub mod history;
pub mod registry;
pub mod types;

pub use change::{ChangeListener, RegistryChange};
pub use error::CoreError;
pub use event_log::EventLog;
pub use history::SessionHistory;
pub use registry::SessionRegistry;
pub use types::*;
