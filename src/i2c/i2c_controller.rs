// Licensed under the Apache-2.0 license

//! embedded-hal front end for an [`I2cMaster`].
//!
//! The same controller serves 7-bit and 10-bit targets; the address type
//! picked by the caller selects the addressing mode.

use crate::i2c::traits::{I2cHardwareCore, I2cMaster};
use embedded_hal::i2c::{AddressMode, Operation};

pub struct I2cController<H> {
    pub hardware: H,
}

impl<H> I2cController<H> {
    pub fn new(hardware: H) -> Self {
        Self { hardware }
    }

    pub fn into_inner(self) -> H {
        self.hardware
    }
}

impl<H: I2cHardwareCore> embedded_hal::i2c::ErrorType for I2cController<H> {
    type Error = H::Error;
}

impl<A, H> embedded_hal::i2c::I2c<A> for I2cController<H>
where
    A: AddressMode,
    H: I2cMaster<A>,
{
    fn read(&mut self, addr: A, buffer: &mut [u8]) -> Result<(), Self::Error> {
        I2cMaster::<A>::read(&mut self.hardware, addr, buffer)
    }

    fn write(&mut self, addr: A, bytes: &[u8]) -> Result<(), Self::Error> {
        I2cMaster::<A>::write(&mut self.hardware, addr, bytes)
    }

    fn write_read(&mut self, addr: A, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        I2cMaster::<A>::write_read(&mut self.hardware, addr, bytes, buffer)
    }

    fn transaction(
        &mut self,
        addr: A,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        I2cMaster::<A>::transaction_slice(&mut self.hardware, addr, operations)
    }
}
