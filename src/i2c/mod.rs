// Licensed under the Apache-2.0 license

//! NS9xxx I2C driver module.
//!
//! This module provides the master-mode driver for the I2C controller found
//! in the Digi NS9xxx `SoCs`, designed for bare-metal and `no_std`
//! environments. The interrupt handler talks to the driver through a
//! [`Completion`] cell; everything else runs in the caller's context.

pub mod bitbang;
pub mod board;
pub mod common;
pub mod completion;
pub mod i2c_controller;
pub mod ns9xxx_i2c;
pub mod registers;
#[cfg(test)]
pub(crate) mod sim;
pub mod system_setup;
pub mod traits;
pub mod transfer;

pub use bitbang::{BusLines, BusResetReport, FlexLine, GpioBus, ProbeLevels};
pub use board::Board;
pub use common::{Functionality, I2cConfig, I2cConfigBuilder, I2cSpeed, Timeouts};
pub use completion::{Completion, CompletionState, Event, PollEvent};
#[cfg(any(test, feature = "std"))]
pub use completion::StdEvent;
pub use i2c_controller::I2cController;
pub use ns9xxx_i2c::{Error, Ns9xxxI2c};
pub use registers::{AddressingMode, RegisterBlock, Registers};
pub use system_setup::{ControllerPlatform, I2cSystemSetup};
pub use traits::{I2cHardwareCore, I2cMaster};
pub use transfer::{Message, Payload, TransferError};
