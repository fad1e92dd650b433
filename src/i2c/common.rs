// Licensed under the Apache-2.0 license

//! Common types and constants for the NS9xxx I2C driver modules.
//!
//! This module provides the bus speed selection, the controller configuration
//! and its builder, the timing budgets used by the command protocol and the
//! busy recovery, and the capability flags reported to the transfer layer.

use crate::i2c::bitbang::ProbeLevels;
use fugit::MillisDurationU32;

/// Bus frequencies the clock divider can be programmed for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
}

impl I2cSpeed {
    #[must_use]
    pub const fn hz(self) -> u32 {
        self as u32
    }

    /// Maps a raw frequency onto a supported speed.
    #[must_use]
    pub const fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            100_000 => Some(Self::Standard),
            400_000 => Some(Self::Fast),
            _ => None,
        }
    }
}

/// Wait budgets for the command protocol and the busy recovery.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// How long a command may wait for its completion interrupt.
    pub command: MillisDurationU32,
    /// How long one busy-recovery attempt polls the lock bit.
    pub busy_window: MillisDurationU32,
    /// Sleep between two lock-bit polls.
    pub busy_poll: MillisDurationU32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: MillisDurationU32::millis(100),
            busy_window: MillisDurationU32::millis(1000),
            busy_poll: MillisDurationU32::millis(1),
        }
    }
}

pub const DEFAULT_BUSY_ATTEMPTS: u8 = 10;
pub const DEFAULT_ARBITRATION_RETRIES: u8 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cConfig {
    /// Bus speed; `None` programs the standard 100 kHz rate.
    pub speed: Option<I2cSpeed>,
    /// Clock skew compensation subtracted in the divider calculation.
    pub scl_delay: u32,
    pub timeouts: Timeouts,
    /// Reinit attempts made by the busy recovery before giving up.
    pub busy_attempts: u8,
    /// Message-loop restarts allowed after arbitration loss.
    pub arbitration_retries: u8,
    /// SDA levels driven by the zero-length address probe.
    pub probe_levels: ProbeLevels,
}

impl I2cConfig {
    #[must_use]
    pub fn bus_speed(&self) -> I2cSpeed {
        self.speed.unwrap_or(I2cSpeed::Standard)
    }
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfigBuilder::new().build()
    }
}

pub struct I2cConfigBuilder {
    speed: Option<I2cSpeed>,
    scl_delay: u32,
    timeouts: Timeouts,
    busy_attempts: u8,
    arbitration_retries: u8,
    probe_levels: ProbeLevels,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            speed: None,
            scl_delay: 0,
            timeouts: Timeouts::default(),
            busy_attempts: DEFAULT_BUSY_ATTEMPTS,
            arbitration_retries: DEFAULT_ARBITRATION_RETRIES,
            probe_levels: ProbeLevels::Legacy,
        }
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.speed = Some(speed);
        self
    }
    #[must_use]
    pub fn scl_delay(mut self, delay: u32) -> Self {
        self.scl_delay = delay;
        self
    }
    #[must_use]
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
    #[must_use]
    pub fn command_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.timeouts.command = timeout;
        self
    }
    #[must_use]
    pub fn busy_attempts(mut self, attempts: u8) -> Self {
        self.busy_attempts = attempts;
        self
    }
    #[must_use]
    pub fn arbitration_retries(mut self, retries: u8) -> Self {
        self.arbitration_retries = retries;
        self
    }
    #[must_use]
    pub fn probe_levels(mut self, levels: ProbeLevels) -> Self {
        self.probe_levels = levels;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            speed: self.speed,
            scl_delay: self.scl_delay,
            timeouts: self.timeouts,
            busy_attempts: self.busy_attempts,
            arbitration_retries: self.arbitration_retries,
            probe_levels: self.probe_levels,
        }
    }
}

bitflags::bitflags! {
    /// Transfer capabilities, using the bit values of the Linux adapter API.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Functionality: u32 {
        const I2C = 0x0000_0001;
        const TEN_BIT_ADDR = 0x0000_0002;
        const SMBUS_QUICK = 0x0001_0000;
        const SMBUS_READ_BYTE = 0x0002_0000;
        const SMBUS_WRITE_BYTE = 0x0004_0000;
        const SMBUS_READ_BYTE_DATA = 0x0008_0000;
        const SMBUS_WRITE_BYTE_DATA = 0x0010_0000;
        const SMBUS_READ_WORD_DATA = 0x0020_0000;
        const SMBUS_WRITE_WORD_DATA = 0x0040_0000;

        const SMBUS_BYTE = Self::SMBUS_READ_BYTE.bits() | Self::SMBUS_WRITE_BYTE.bits();
        const SMBUS_BYTE_DATA =
            Self::SMBUS_READ_BYTE_DATA.bits() | Self::SMBUS_WRITE_BYTE_DATA.bits();
        const SMBUS_WORD_DATA =
            Self::SMBUS_READ_WORD_DATA.bits() | Self::SMBUS_WRITE_WORD_DATA.bits();
    }
}
