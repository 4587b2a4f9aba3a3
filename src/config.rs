use crate::error::{Error, Result};
use crate::{BASE, MEMORY_SIZE};
use serde::{Deserialize, Serialize};
use sloggers::types::Severity;
use std::fs;
use std::path::Path;

/// Tunables for driving a machine. Every field has a default, so a config file
/// only needs to name the ones it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// instructions executed per second
    pub clock_hz: u32,
    /// delay/sound timer decrements per second, also the frame publish rate
    pub timer_hz: u32,
    /// address programs are loaded at
    pub base: u16,
    pub log_level: Severity,
    /// how many unconsumed frames may queue up before new ones get dropped
    pub frame_queue: usize,
    /// fixed seed for CXNN, entropy when unset
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            clock_hz: 500,
            timer_hz: 60,
            base: BASE as u16,
            log_level: Severity::Info,
            frame_queue: 2,
            seed: None,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.clock_hz == 0 {
            return Err(Error::InvalidConfig("clock_hz must be nonzero".into()));
        }
        if self.timer_hz == 0 {
            return Err(Error::InvalidConfig("timer_hz must be nonzero".into()));
        }
        if self.base as usize > MEMORY_SIZE {
            return Err(Error::InvalidConfig(format!(
                "base {:#05X} is past the end of memory",
                self.base
            )));
        }
        Ok(())
    }

    /// Splits `clock_hz` instructions across `timer_hz` frames per second
    pub fn pacer(&self) -> Pacer {
        Pacer {
            clock_hz: self.clock_hz,
            timer_hz: self.timer_hz.max(1),
            owed: 0,
        }
    }
}

/// Hands out instruction budgets one frame at a time. The remainder of
/// `clock_hz / timer_hz` carries over, so any `timer_hz` consecutive frames
/// add up to exactly `clock_hz` instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct Pacer {
    clock_hz: u32,
    timer_hz: u32,
    owed: u32,
}

impl Pacer {
    pub fn next_frame(&mut self) -> u32 {
        self.owed += self.clock_hz;
        let cycles = self.owed / self.timer_hz;
        self.owed %= self.timer_hz;
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.clock_hz, 500);
        assert_eq!(config.timer_hz, 60);
        assert_eq!(config.base, 0x200);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            Config::from_json(r#"{ "clock_hz": 600, "log_level": "debug", "seed": 7 }"#).unwrap();
        assert_eq!(config.clock_hz, 600);
        assert_eq!(config.timer_hz, 60);
        assert_eq!(config.log_level, Severity::Debug);
        assert_eq!(config.pacer().next_frame(), 10);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(matches!(
            Config::from_json(r#"{ "timer_hz": 0 }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{ "clock_hz": 0 }"#),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_bad_json() {
        assert!(matches!(Config::from_json("{ clock_hz"), Err(Error::Config(_))));
    }

    #[test]
    fn pacer_runs_full_clock_rate() {
        let mut pacer = Config::default().pacer();
        let frames: Vec<u32> = (0..60).map(|_| pacer.next_frame()).collect();

        assert_eq!(frames.iter().sum::<u32>(), 500);
        assert!(frames.iter().all(|n| *n == 8 || *n == 9));
        // the next second starts over with the same split
        let again: Vec<u32> = (0..60).map(|_| pacer.next_frame()).collect();
        assert_eq!(frames, again);
    }

    #[test]
    fn slow_clock_skips_frames() {
        let config = Config {
            clock_hz: 30,
            ..Config::default()
        };
        let mut pacer = config.pacer();
        let frames: Vec<u32> = (0..60).map(|_| pacer.next_frame()).collect();

        assert_eq!(frames.iter().sum::<u32>(), 30);
        assert_eq!(&frames[..4], &[0, 1, 0, 1]);
    }
}
