use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::models::{ControlMode, DetectionState, RelayState, SensorReading, ThresholdConfig};
use crate::sensors::IngestOutcome;

/// Server timestamp in the `YYYY-MM-DD HH:MM:SS` form the original clients
/// already parse.
pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SensorReadingDto {
    pub sensor_id: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub motion_detected: DetectionState,
    pub vibration_detected: DetectionState,
    pub relay_state: RelayState,
    pub timestamp: DateTime<Utc>,
}

impl From<SensorReading> for SensorReadingDto {
    fn from(r: SensorReading) -> Self {
        Self {
            sensor_id: r.sensor_id,
            temperature: r.temperature,
            humidity: r.humidity,
            motion_detected: r.motion_detected,
            vibration_detected: r.vibration_detected,
            relay_state: r.relay_state,
            timestamp: r.recorded_at,
        }
    }
}

/// Dashboard headline derived from the latest reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum SystemStatus {
    #[serde(rename = "MOTION DETECTED")]
    MotionDetected,
    #[serde(rename = "VIBRATION ALERT")]
    VibrationAlert,
    #[serde(rename = "MONITORING")]
    Monitoring,
    #[serde(rename = "OFFLINE")]
    Offline,
}

impl SystemStatus {
    /// Motion outranks vibration; no rows at all means the device is offline.
    pub fn from_latest(latest: Option<&SensorReading>) -> Self {
        match latest {
            None => Self::Offline,
            Some(r) if r.motion_detected == DetectionState::Detected => Self::MotionDetected,
            Some(r) if r.vibration_detected == DetectionState::Detected => Self::VibrationAlert,
            Some(_) => Self::Monitoring,
        }
    }
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

/// Reply to `/telemetry/ingest`. The device acts on `relay_command` whether
/// or not the sample was persisted, so the error shape still carries one.
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub relay_command: RelayState,
    pub control_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ControlMode>,
    pub timestamp: String,
}

impl IngestResponse {
    pub fn success(outcome: &IngestOutcome) -> Self {
        Self {
            status: "success".into(),
            message: None,
            relay_command: outcome.command,
            control_reason: outcome.reason.to_string(),
            mode: Some(outcome.mode),
            timestamp: now_stamp(),
        }
    }

    /// Safe fallback when ingestion failed: the relay is commanded OFF.
    pub fn fallback() -> Self {
        Self {
            status: "error".into(),
            message: Some("Server error processing request. Check server logs.".into()),
            relay_command: RelayState::Off,
            control_reason: "error".into(),
            mode: None,
            timestamp: now_stamp(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RelayControlResponse {
    pub status: String,
    pub message: String,
    pub relay_state: RelayState,
    pub control_reason: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LatestReadingResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SensorReadingDto>,
    pub system_status: SystemStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingsResponse {
    pub status: String,
    /// Chronological, oldest first.
    pub data: Vec<SensorReadingDto>,
    pub latest_reading: Option<SensorReadingDto>,
    pub count_in_response: usize,
    pub total_records_in_table: i64,
    pub limit_applied: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThresholdsResponse {
    pub status: String,
    pub temp_threshold: f64,
    pub temp_low_threshold: f64,
    pub hum_threshold: f64,
    pub auto_relay: bool,
    pub relay_command: RelayState,
    pub relay_reason: String,
}

/// The threshold fields as confirmed back to update clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ThresholdValues {
    pub temp_high_threshold: f64,
    pub temp_low_threshold: f64,
    pub humidity_threshold: f64,
    pub auto_relay: bool,
}

impl From<&ThresholdConfig> for ThresholdValues {
    fn from(c: &ThresholdConfig) -> Self {
        Self {
            temp_high_threshold: c.temp_high_threshold,
            temp_low_threshold: c.temp_low_threshold,
            humidity_threshold: c.humidity_threshold,
            auto_relay: c.control_mode == ControlMode::Auto,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateDebugInfo {
    pub previous_values: ThresholdValues,
    /// Fields that were present in the request but unparseable or out of
    /// range, and therefore not applied.
    pub dropped_fields: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateThresholdsResponse {
    pub status: String,
    pub message: String,
    pub affected_rows: u64,
    pub updated_values: ThresholdValues,
    pub debug_info: UpdateDebugInfo,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPayload {
    pub user_id: i64,
    pub user_email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UserPayload>,
}
