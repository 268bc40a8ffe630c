#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vigil::capture::resolution::STANDARD_PROFILES;
use vigil::capture::synthetic::test_pattern;
use vigil::capture::{
    DriverError, ResolutionTable, SensorConfig, SensorDriver, SensorFrame, SharedSensor,
};
use vigil::config::SensorSettings;

/// Counters and switches shared between a test and its [`ScriptedSensor`]
#[derive(Clone, Default)]
pub struct Probe {
    pub inits: Arc<AtomicUsize>,
    pub deinits: Arc<AtomicUsize>,
    pub fetches: Arc<AtomicUsize>,
    pub returns: Arc<AtomicUsize>,
    /// Length of every frame handed out, in order
    pub sizes: Arc<Mutex<Vec<usize>>>,
    pub fail_init: Arc<AtomicBool>,
    pub starve: Arc<AtomicBool>,
    pub last_config: Arc<Mutex<Option<SensorConfig>>>,
}

impl Probe {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn returns(&self) -> usize {
        self.returns.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.sizes.lock().unwrap().clone()
    }

    pub fn last_config(&self) -> Option<SensorConfig> {
        self.last_config.lock().unwrap().clone()
    }
}

/// Sensor that serves small test-pattern JPEGs and records every call
pub struct ScriptedSensor {
    probe: Probe,
    config: Option<SensorConfig>,
}

impl ScriptedSensor {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            config: None,
        }
    }
}

impl SensorDriver for ScriptedSensor {
    fn init(&mut self, config: &SensorConfig) -> Result<(), DriverError> {
        self.probe.inits.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_config.lock().unwrap() = Some(config.clone());
        if self.probe.fail_init.load(Ordering::SeqCst) {
            return Err(DriverError("sensor not responding".into()));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), DriverError> {
        self.probe.deinits.fetch_add(1, Ordering::SeqCst);
        self.config = None;
        Ok(())
    }

    fn get_frame(&mut self) -> Option<SensorFrame> {
        if self.probe.starve.load(Ordering::SeqCst) {
            return None;
        }
        let config = self.config.as_ref()?;
        let n = self.probe.fetches.fetch_add(1, Ordering::SeqCst) as u32;
        // Small frames keep the tests fast; the phase makes every frame differ
        let jpeg = test_pattern(config.width / 4, config.height / 4, 80, n * 16)?;
        self.probe.sizes.lock().unwrap().push(jpeg.len());
        Some(SensorFrame::new(jpeg))
    }

    fn return_frame(&mut self, _frame: SensorFrame) {
        self.probe.returns.fetch_add(1, Ordering::SeqCst);
    }
}

/// QQVGA then VGA
pub fn two_entry_table() -> ResolutionTable {
    let mut vga = STANDARD_PROFILES[9];
    vga.index = 1;
    ResolutionTable::new(vec![STANDARD_PROFILES[0], vga]).unwrap()
}

pub fn sensor_config(index: usize) -> SensorConfig {
    SensorConfig::new(&SensorSettings::default(), &STANDARD_PROFILES[index])
}

pub fn shared_sensor(probe: &Probe) -> Arc<SharedSensor> {
    Arc::new(SharedSensor::new(
        Box::new(ScriptedSensor::new(probe.clone())),
        std::time::Duration::from_secs(5),
    ))
}
