use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Commanded relay state. Stored as TEXT (`'ON'` / `'OFF'`), which is also
/// the exact wire form the device sends and expects back.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    On,
    #[default]
    Off,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayState::On => "ON",
            RelayState::Off => "OFF",
        })
    }
}

impl FromStr for RelayState {
    type Err = anyhow::Error;

    /// Strict, case-sensitive parse: exactly `ON` or `OFF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(anyhow::anyhow!("unknown relay state: {other:?}")),
        }
    }
}

/// Binary sensor reading as reported by the device (`'DETECTED'` / `'CLEAR'`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectionState {
    Detected,
    #[default]
    Clear,
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionState::Detected => "DETECTED",
            DetectionState::Clear => "CLEAR",
        })
    }
}

impl FromStr for DetectionState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DETECTED" => Ok(Self::Detected),
            "CLEAR" => Ok(Self::Clear),
            other => Err(anyhow::anyhow!("unknown detection state: {other:?}")),
        }
    }
}

/// Who is allowed to write `current_relay_state`: the arbiter (AUTO) or the
/// operator (MANUAL).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlMode {
    #[default]
    Auto,
    Manual,
}

/// The singleton configuration row (`threshold_id` is always 1).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ThresholdConfig {
    pub threshold_id: i64,
    pub temp_high_threshold: f64,
    pub temp_low_threshold: f64,
    pub humidity_threshold: f64,
    pub control_mode: ControlMode,
    pub current_relay_state: RelayState,
}

impl Default for ThresholdConfig {
    /// The row that lazy initialisation writes on first contact.
    fn default() -> Self {
        Self {
            threshold_id: 1,
            temp_high_threshold: 30.0,
            temp_low_threshold: 18.0,
            humidity_threshold: 90.0,
            control_mode: ControlMode::Auto,
            current_relay_state: RelayState::Off,
        }
    }
}

/// One row of the append-only telemetry log.
///
/// `relay_state` is the command computed at ingestion time, never the state
/// the device claimed to be in.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SensorReading {
    pub sensor_id: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub motion_detected: DetectionState,
    pub vibration_detected: DetectionState,
    pub relay_state: RelayState,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserAccount {
    pub user_id: i64,
    pub user_email: String,
    /// Argon2 hash in PHC string format.
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
}
