// Licensed under the Apache-2.0 license

//! # I2C Hardware Abstraction Traits
//!
//! `I2cHardwareCore` covers bring-up, timing and recovery. `I2cMaster` adds
//! the master-mode data operations on top of it.
//!
//! ```text
//! I2cHardwareCore (foundation)
//!     └── I2cMaster<A> (master operations, 7-bit or 10-bit addresses)
//! ```

use crate::i2c::common::{Functionality, I2cSpeed};
use embedded_hal::i2c::{AddressMode, Operation, SevenBitAddress};

/// Core I2C hardware interface providing basic operations
///
/// # Examples
///
/// ```rust,ignore
/// use ns9xxx_i2c::i2c::{I2cHardwareCore, I2cSpeed};
///
/// fn setup_i2c<T: I2cHardwareCore>(controller: &mut T) -> Result<u32, T::Error> {
///     controller.init()?;
///     controller.configure_timing(I2cSpeed::Fast)
/// }
/// ```
pub trait I2cHardwareCore {
    /// Hardware-specific error type that implements embedded-hal error traits
    type Error: embedded_hal::i2c::Error + core::fmt::Debug;

    /// Initialize the controller and unmask its interrupt.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot be brought up.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Programs the bus clock for `speed`.
    ///
    /// Returns the configuration word written to the controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested speed cannot be produced.
    fn configure_timing(&mut self, speed: I2cSpeed) -> Result<u32, Self::Error>;

    /// Attempt to recover the I2C bus from stuck conditions
    ///
    /// # Errors
    ///
    /// Returns an error if the bus lines are not idle after recovery.
    fn recover_bus(&mut self) -> Result<(), Self::Error>;

    /// Transfer modes the controller supports.
    fn functionality(&self) -> Functionality;
}

/// I2C Master mode operations
///
/// The address type `A` must implement `AddressMode` to ensure compatibility
/// with embedded-hal: `SevenBitAddress` (u8) or `TenBitAddress` (u16).
pub trait I2cMaster<A: AddressMode = SevenBitAddress>: I2cHardwareCore {
    /// Write data to a slave device at the given address
    ///
    /// # Errors
    ///
    /// Returns an error if the slave does not acknowledge, bus arbitration
    /// is lost, or other I2C protocol errors occur.
    fn write(&mut self, addr: A, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Read data from a slave device at the given address
    ///
    /// # Errors
    ///
    /// Returns an error if the slave does not acknowledge, bus arbitration
    /// is lost, or other I2C protocol errors occur.
    fn read(&mut self, addr: A, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Combined write-then-read operation with restart condition
    ///
    /// # Errors
    ///
    /// Returns an error if the slave does not acknowledge during either
    /// phase or if bus arbitration is lost too often.
    fn write_read(&mut self, addr: A, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Execute a sequence of I2C operations as a single transaction
    ///
    /// Adjacent operations of the same direction are merged without a
    /// repeated START.
    ///
    /// # Errors
    ///
    /// Returns an error if any operation in the sequence fails; the
    /// remaining operations are not executed.
    fn transaction_slice(
        &mut self,
        addr: A,
        ops_slice: &mut [Operation<'_>],
    ) -> Result<(), Self::Error>;
}
