pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod state;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{EventEnvelope, SessionEvent};
pub use paths::Paths;
pub use state::SessionState;
