use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::control::arbiter::{self, ControlReason};
use crate::db::models::{ControlMode, DetectionState, RelayState, SensorReading};
use crate::settings::store;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// One telemetry sample as sent by the device, already leniently parsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub temperature: f64,
    pub humidity: f64,
    pub motion: DetectionState,
    pub vibration: DetectionState,
    /// What the device believes its relay is doing. Informational only; the
    /// computed command is authoritative.
    pub reported_relay: RelayState,
}

/// What a successful ingestion produced, for the response to the device.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub command: RelayState,
    pub reason: ControlReason,
    pub mode: ControlMode,
    pub reading: SensorReading,
}

/// A page of history plus the context the dashboard wants alongside it.
#[derive(Debug, Clone)]
pub struct ReadingPage {
    /// Chronological, oldest first.
    pub readings: Vec<SensorReading>,
    pub latest: Option<SensorReading>,
    pub total: i64,
}

#[derive(Clone)]
pub struct TelemetryService {
    pool: SqlitePool,
}

impl TelemetryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ingest one telemetry sample: arbitrate the relay command, persist it
    /// into the config row and append the reading.
    ///
    /// The whole read-decide-write sequence runs in a single transaction, so
    /// two concurrent ingestions (or an ingestion racing a manual override)
    /// cannot lose an update on `current_relay_state`, and a reading row is
    /// only ever visible together with the relay state it produced.
    pub async fn ingest(&self, sample: &TelemetrySample) -> sqlx::Result<IngestOutcome> {
        let mut tx = self.pool.begin().await?;

        let (config, _) = store::load_or_init(&mut tx).await?;
        let decision = arbiter::decide(
            config.control_mode,
            config.current_relay_state,
            sample.motion,
            sample.vibration,
        );
        store::set_relay_state(&mut tx, decision.command).await?;

        let reading: SensorReading = sqlx::query_as(
            "INSERT INTO sensor_readings \
             (temperature, humidity, motion_detected, vibration_detected, relay_state, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING *",
        )
        .bind(sample.temperature)
        .bind(sample.humidity)
        .bind(sample.motion)
        .bind(sample.vibration)
        .bind(decision.command)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if sample.reported_relay != decision.command {
            debug!(
                reported = %sample.reported_relay,
                commanded = %decision.command,
                "device-reported relay state disagrees with computed command"
            );
        }
        info!(
            command = %decision.command,
            reason = %decision.reason,
            mode = ?config.control_mode,
            motion = %sample.motion,
            vibration = %sample.vibration,
            "telemetry ingested"
        );

        Ok(IngestOutcome {
            command: decision.command,
            reason: decision.reason,
            mode: config.control_mode,
            reading,
        })
    }

    pub async fn latest_reading(&self) -> sqlx::Result<Option<SensorReading>> {
        sqlx::query_as(
            "SELECT * FROM sensor_readings ORDER BY recorded_at DESC, sensor_id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
    }

    /// The most recent `limit` readings (chronological, oldest first), the
    /// newest reading, and the total row count.
    pub async fn reading_page(&self, limit: i64) -> sqlx::Result<ReadingPage> {
        let mut newest_first: Vec<SensorReading> = sqlx::query_as(
            "SELECT * FROM sensor_readings ORDER BY recorded_at DESC, sensor_id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sensor_readings")
            .fetch_one(&self.pool)
            .await?;

        let latest = newest_first.first().cloned();
        // charts want oldest → newest
        newest_first.reverse();

        Ok(ReadingPage {
            readings: newest_first,
            latest,
            total,
        })
    }
}

/// Resolve the raw `limit` parameter: absent, unparseable or sub-1 values
/// fall back to the default; oversized values clamp to the maximum.
pub fn resolve_limit(raw: Option<&str>) -> i64 {
    let parsed = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_PAGE_LIMIT);
    if parsed < 1 {
        DEFAULT_PAGE_LIMIT
    } else {
        parsed.min(MAX_PAGE_LIMIT)
    }
}
