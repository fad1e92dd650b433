// Licensed under the Apache-2.0 license

//! I2C System Setup Helper
//!
//! This module separates the controller from the system services it depends
//! on: masking its interrupt line and querying the reference clock. It also
//! holds the clock divider calculation, which only needs the source clock and
//! the board's SCL delay.

use crate::i2c::common::I2cSpeed;
use crate::i2c::registers::{CONFIG_CLKREF_MASK, CONFIG_FAST_MODE, CONFIG_VSCD};
use fugit::HertzU32;

/// System services the controller needs from its platform.
pub trait ControllerPlatform {
    /// Masks the controller interrupt line. Calls nest with `enable_irq`.
    fn disable_irq(&mut self);

    fn enable_irq(&mut self);

    /// Rate of the clock feeding the I2C divider.
    fn source_clock(&self) -> HertzU32;
}

impl<P: ControllerPlatform + ?Sized> ControllerPlatform for &mut P {
    fn disable_irq(&mut self) {
        (**self).disable_irq();
    }
    fn enable_irq(&mut self) {
        (**self).enable_irq();
    }
    fn source_clock(&self) -> HertzU32 {
        (**self).source_clock()
    }
}

/// Helper for system-level controller configuration
pub struct I2cSystemSetup;

impl I2cSystemSetup {
    /// Computes the configuration word selecting `speed`.
    ///
    /// Keeps every bit of `current` outside the timing fields. The divider is
    /// `(clk / 4f - 4 - scl_delay) / 2` in standard mode and
    /// `(clk / 4f - 4 - scl_delay) * 2 / 3` in fast mode, evaluated in
    /// wrapping 32-bit arithmetic and truncated to the CLKREF field.
    #[must_use]
    pub fn clock_config(current: u32, source: HertzU32, speed: I2cSpeed, scl_delay: u32) -> u32 {
        let f = speed.hz();
        let base = (source.raw() / (4 * f)).wrapping_sub(4).wrapping_sub(scl_delay);
        let config = current & !CONFIG_CLKREF_MASK & !CONFIG_VSCD;
        match speed {
            I2cSpeed::Standard => {
                (config & !CONFIG_FAST_MODE) | ((base / 2) & CONFIG_CLKREF_MASK)
            }
            I2cSpeed::Fast => {
                config | CONFIG_FAST_MODE | ((base.wrapping_mul(2) / 3) & CONFIG_CLKREF_MASK)
            }
        }
    }

    /// Source clock rate reported by the platform.
    pub fn source_frequency<P: ControllerPlatform>(platform: &P) -> HertzU32 {
        platform.source_clock()
    }
}
