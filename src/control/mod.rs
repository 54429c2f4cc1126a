pub mod arbiter;
pub mod service;

pub use service::{ManualControlError, RelayControlService};
