use arrayvec::ArrayVec;

use crate::Error;

const CONFIG_CAPACITY: usize = 32;

// Keys are 16-bit Fletcher checksums of the option name, so lookups stay
// integer comparisons and no strings live past boot.
pub const fn checksum(name: &str) -> u16 {
    let bytes = name.as_bytes();
    let mut sum1: u16 = 0;
    let mut sum2: u16 = 0;
    let mut i = 0;
    while i < bytes.len() {
        sum1 = (sum1 + bytes[i] as u16) % 255;
        sum2 = (sum2 + sum1) % 255;
        i += 1;
    }
    (sum2 << 8) | sum1
}

pub const ACCELERATION_TICKS_PER_SECOND: u16 = checksum("acceleration_ticks_per_second");
pub const MINIMUM_STEPS_PER_MINUTE: u16 = checksum("minimum_steps_per_minute");
pub const BASE_STEPPING_FREQUENCY: u16 = checksum("base_stepping_frequency");
pub const MICROSECONDS_PER_STEP_PULSE: u16 = checksum("microseconds_per_step_pulse");

// Numeric option store with by-default fallback, fixed capacity.
#[derive(Default)]
pub struct Config {
    entries: ArrayVec<(u16, f32), CONFIG_CAPACITY>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: u16, value: f32) -> Result<(), Error> {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
            return Ok(());
        }
        self.entries.try_push((key, value)).map_err(|_| Error::ConfigFull)
    }

    pub fn value(&self, key: u16) -> ConfigValue {
        ConfigValue(self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v))
    }
}

#[derive(Clone, Copy)]
pub struct ConfigValue(Option<f32>);

impl ConfigValue {
    pub fn by_default(self, default: f32) -> ConfigValue {
        ConfigValue(Some(self.0.unwrap_or(default)))
    }

    pub fn as_number(&self) -> f32 {
        self.0.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable() {
        assert_eq!(checksum("acceleration_ticks_per_second"), ACCELERATION_TICKS_PER_SECOND);
        assert_ne!(ACCELERATION_TICKS_PER_SECOND, MINIMUM_STEPS_PER_MINUTE);
        assert_ne!(BASE_STEPPING_FREQUENCY, MICROSECONDS_PER_STEP_PULSE);
    }

    #[test]
    fn missing_key_takes_default() {
        let config = Config::new();
        assert_eq!(config.value(MINIMUM_STEPS_PER_MINUTE).by_default(3000.0).as_number(), 3000.0);
    }

    #[test]
    fn set_key_overrides_default() {
        let mut config = Config::new();
        config.set(MINIMUM_STEPS_PER_MINUTE, 1200.0).unwrap();
        assert_eq!(config.value(MINIMUM_STEPS_PER_MINUTE).by_default(3000.0).as_number(), 1200.0);
    }

    #[test]
    fn set_twice_replaces() {
        let mut config = Config::new();
        config.set(BASE_STEPPING_FREQUENCY, 50_000.0).unwrap();
        config.set(BASE_STEPPING_FREQUENCY, 100_000.0).unwrap();
        assert_eq!(config.value(BASE_STEPPING_FREQUENCY).by_default(0.0).as_number(), 100_000.0);
    }

    #[test]
    fn unset_key_without_default_is_zero() {
        let config = Config::new();
        assert_eq!(config.value(checksum("nonexistent")).as_number(), 0.0);
    }
}
