//! Sensor resolution selection over a fixed, ordered profile table

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::capture::sensor::{SensorMode, SharedSensor};
use crate::{Error, Result};

/// QVGA in the standard table
pub const DEFAULT_RESOLUTION_INDEX: usize = 5;

/// One selectable sensor resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionProfile {
    pub index: usize,
    pub mode: SensorMode,
    pub width: u32,
    pub height: u32,
}

const fn profile(index: usize, mode: SensorMode, width: u32, height: u32) -> ResolutionProfile {
    ResolutionProfile {
        index,
        mode,
        width,
        height,
    }
}

/// Modes supported by the on-board 2-3 MP sensor, smallest first.
/// 96x96 and QXGA are left out, the sensor is unstable there.
pub const STANDARD_PROFILES: [ResolutionProfile; 16] = [
    profile(0, SensorMode::Qqvga, 160, 120),
    profile(1, SensorMode::R128x128, 128, 128),
    profile(2, SensorMode::Qcif, 176, 144),
    profile(3, SensorMode::Hqvga, 240, 176),
    profile(4, SensorMode::R240x240, 240, 240),
    profile(5, SensorMode::Qvga, 320, 240),
    profile(6, SensorMode::R320x320, 320, 320),
    profile(7, SensorMode::Cif, 400, 296),
    profile(8, SensorMode::Hvga, 480, 320),
    profile(9, SensorMode::Vga, 640, 480),
    profile(10, SensorMode::Svga, 800, 600),
    profile(11, SensorMode::Xga, 1024, 768),
    profile(12, SensorMode::Hd, 1280, 720),
    profile(13, SensorMode::Sxga, 1280, 1024),
    profile(14, SensorMode::Uxga, 1600, 1200),
    profile(15, SensorMode::Fhd, 1920, 1080),
];

/// Non-empty table whose entries are indexed 0..len in order
#[derive(Debug, Clone)]
pub struct ResolutionTable {
    profiles: Arc<[ResolutionProfile]>,
}

impl ResolutionTable {
    pub fn standard() -> Self {
        Self {
            profiles: Arc::from(&STANDARD_PROFILES[..]),
        }
    }

    pub fn new(profiles: Vec<ResolutionProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(Error::InvalidConfig("resolution table is empty".into()));
        }
        if let Some(bad) = profiles.iter().enumerate().find(|(i, p)| p.index != *i) {
            return Err(Error::InvalidConfig(format!(
                "resolution profile at position {} carries index {}",
                bad.0, bad.1.index
            )));
        }
        Ok(Self {
            profiles: Arc::from(profiles),
        })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ResolutionProfile> {
        self.profiles.get(index).copied()
    }
}

impl Default for ResolutionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Decrease,
    Increase,
}

impl From<i32> for Direction {
    /// Shell codes: `0` or negative steps down, anything positive steps up.
    fn from(code: i32) -> Self {
        if code > 0 {
            Self::Increase
        } else {
            Self::Decrease
        }
    }
}

/// Steps the active resolution through the table, wrapping at both ends,
/// and restarts the sensor under the camera lock.
pub struct ResolutionController {
    sensor: Arc<SharedSensor>,
    table: ResolutionTable,
    index: AtomicUsize,
    reinit_delay: Duration,
}

impl ResolutionController {
    pub fn new(
        sensor: Arc<SharedSensor>,
        table: ResolutionTable,
        default_index: usize,
        reinit_delay: Duration,
    ) -> Result<Self> {
        if default_index >= table.len() {
            return Err(Error::InvalidConfig(format!(
                "default resolution {default_index} outside table of {}",
                table.len()
            )));
        }
        Ok(Self {
            sensor,
            table,
            index: AtomicUsize::new(default_index),
            reinit_delay,
        })
    }

    pub fn index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    pub fn current_profile(&self) -> Option<ResolutionProfile> {
        self.table.get(self.index())
    }

    /// Active (width, height), or (0, 0) if the index is somehow out of range.
    pub fn current(&self) -> (u32, u32) {
        self.current_profile()
            .map(|p| (p.width, p.height))
            .unwrap_or((0, 0))
    }

    pub fn count(&self) -> usize {
        self.table.len()
    }

    pub fn profile_at(&self, index: usize) -> Option<ResolutionProfile> {
        self.table.get(index)
    }

    /// Move one entry up or down and restart the sensor with it.
    ///
    /// The new index sticks even when the restart fails: the sensor is then
    /// left offline and `ReinitFailed` is returned, so a later `step` or a
    /// fresh initialization can bring it back.
    #[instrument(skip(self))]
    pub async fn step(&self, direction: Direction) -> Result<ResolutionProfile> {
        let mut slot = self.sensor.acquire().await?;
        if !slot.is_configured() {
            return Err(Error::SensorOffline);
        }

        let len = self.table.len();
        let current = self.index();
        let next = match direction {
            Direction::Decrease => (current + len - 1) % len,
            Direction::Increase => (current + 1) % len,
        };
        let profile = self
            .table
            .get(next)
            .ok_or_else(|| Error::InvalidConfig(format!("resolution index {next} out of range")))?;
        self.index.store(next, Ordering::Release);
        slot.apply_profile(&profile);
        metrics::counter!("vigil_resolution_changes_total").increment(1);
        info!(
            from = current,
            to = next,
            width = profile.width,
            height = profile.height,
            "changing sensor resolution"
        );

        if let Err(e) = slot.stop() {
            warn!(error = %e, "sensor stop failed during resolution change");
        }
        tokio::time::sleep(self.reinit_delay).await;
        let restarted = slot.start();
        tokio::time::sleep(self.reinit_delay).await;

        match restarted {
            Ok(()) => {
                info!("Resolution set to {}x{}", profile.width, profile.height);
                Ok(profile)
            }
            Err(e) => {
                error!(error = %e, "sensor restart failed, camera left offline");
                Err(Error::ReinitFailed {
                    width: profile.width,
                    height: profile.height,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_ordered() {
        let table = ResolutionTable::standard();
        assert_eq!(table.len(), 16);
        for i in 0..table.len() {
            assert_eq!(table.get(i).unwrap().index, i);
        }
        let qvga = table.get(DEFAULT_RESOLUTION_INDEX).unwrap();
        assert_eq!((qvga.width, qvga.height), (320, 240));
        assert!(table.get(16).is_none());
    }

    #[test]
    fn rejects_empty_or_misindexed_tables() {
        assert!(ResolutionTable::new(Vec::new()).is_err());
        let misindexed = vec![profile(1, SensorMode::Vga, 640, 480)];
        assert!(ResolutionTable::new(misindexed).is_err());
    }

    #[test]
    fn direction_codes() {
        assert_eq!(Direction::from(1), Direction::Increase);
        assert_eq!(Direction::from(0), Direction::Decrease);
        assert_eq!(Direction::from(-1), Direction::Decrease);
    }
}
