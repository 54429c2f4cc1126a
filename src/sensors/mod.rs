pub mod service;

pub use service::{IngestOutcome, ReadingPage, TelemetrySample, TelemetryService};
