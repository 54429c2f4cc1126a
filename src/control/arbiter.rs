use std::fmt;

use crate::db::models::{ControlMode, DetectionState, RelayState};

/// Why the arbiter picked its command. Rendered verbatim into the
/// `control_reason` field of the ingestion response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReason {
    AutoDetected,
    AutoClear,
    Manual,
}

impl fmt::Display for ControlReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlReason::AutoDetected => "auto_sensor_detected",
            ControlReason::AutoClear => "auto_sensor_clear",
            ControlReason::Manual => "manual_control",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub command: RelayState,
    pub reason: ControlReason,
}

/// Decide the relay command for one telemetry sample.
///
/// In AUTO mode the relay follows the sensors: any DETECTED input switches it
/// on. In MANUAL mode the persisted operator command wins and the sensor
/// values are ignored. `manual_relay_state` must be the value currently
/// persisted in the config row; the arbiter itself never touches the store,
/// so the caller owns the read-decide-write consistency.
pub fn decide(
    mode: ControlMode,
    manual_relay_state: RelayState,
    motion: DetectionState,
    vibration: DetectionState,
) -> Decision {
    match mode {
        ControlMode::Auto => {
            if motion == DetectionState::Detected || vibration == DetectionState::Detected {
                Decision {
                    command: RelayState::On,
                    reason: ControlReason::AutoDetected,
                }
            } else {
                Decision {
                    command: RelayState::Off,
                    reason: ControlReason::AutoClear,
                }
            }
        }
        ControlMode::Manual => Decision {
            command: manual_relay_state,
            reason: ControlReason::Manual,
        },
    }
}
