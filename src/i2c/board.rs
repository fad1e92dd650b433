// Licensed under the Apache-2.0 license

//! Per-module clock trim.
//!
//! The divider formula needs a small board-specific correction to land on the
//! nominal bus rate. The values below were measured on Digi Connect modules.

use crate::i2c::common::{I2cConfigBuilder, I2cSpeed};
use crate::i2c::ns9xxx_i2c::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Board {
    Cc9p9215,
    Ccw9p9215,
    Cme9210,
    Cc9p9360,
    Cc9c,
    Ccw9c,
    Other,
}

impl Board {
    #[must_use]
    pub const fn scl_delay(self) -> u32 {
        match self {
            Board::Cc9p9215 | Board::Ccw9p9215 => 16,
            // 306 per the reference manual, 25 is far more stable
            Board::Cme9210 => 25,
            Board::Cc9p9360 => 12,
            Board::Cc9c | Board::Ccw9c => 2,
            Board::Other => 0,
        }
    }

    /// The CME9210 cannot run its bus in fast mode.
    #[must_use]
    pub const fn supports(self, speed: I2cSpeed) -> bool {
        !matches!((self, speed), (Board::Cme9210, I2cSpeed::Fast))
    }

    /// Builder preloaded with this board's trim and the requested speed.
    pub fn config(self, speed: I2cSpeed) -> Result<I2cConfigBuilder, Error> {
        if !self.supports(speed) {
            return Err(Error::InvalidSpeed);
        }
        Ok(I2cConfigBuilder::new()
            .speed(speed)
            .scl_delay(self.scl_delay()))
    }
}
