pub mod store;

pub use store::{ScreenedUpdate, SettingsStore, ThresholdUpdate, UpdateOutcome};
