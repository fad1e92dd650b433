// Licensed under the Apache-2.0 license

//! Register map of the NS9xxx I2C master.
//!
//! The controller exposes four 32-bit registers. The command register and the
//! status register share offset 0: writes issue a command, reads return the
//! status and acknowledge the latched interrupt.

use crate::i2c::ns9xxx_i2c::Error;
use core::ptr::{read_volatile, write_volatile, NonNull};

pub const I2C_CMD: usize = 0x00;
pub const I2C_STATUS: usize = 0x00;
pub const I2C_MASTERADDR: usize = 0x04;
pub const I2C_SLAVEADDR: usize = 0x08;
pub const I2C_CONFIG: usize = 0x0c;

/// Command words, already shifted into place.
pub mod cmd {
    pub const NOP: u32 = 0;
    pub const READ: u32 = 4 << 8;
    pub const WRITE: u32 = 5 << 8;
    pub const STOP: u32 = 6 << 8;
    /// The low byte of the command carries transmit data.
    pub const TX_VALID: u32 = 1 << 13;

    #[must_use]
    pub const fn transmit(op: u32, byte: u8) -> u32 {
        op | TX_VALID | byte as u32
    }
}

pub const STATUS_BUS_BUSY: u32 = 0x8000;
pub const STATUS_RX_AVAILABLE: u32 = 0x4000;
pub const STATUS_MASTER_LOCK: u32 = 0x1000;
pub const STATUS_IRQ_MASK: u32 = 0x0f00;
pub const STATUS_IRQ_SHIFT: u32 = 8;
pub const STATUS_RX_DATA_MASK: u32 = 0x00ff;

pub const CONFIG_IRQ_DISABLE: u32 = 1 << 15;
pub const CONFIG_FAST_MODE: u32 = 1 << 14;
pub const CONFIG_VSCD: u32 = 1 << 13;
pub const CONFIG_SFW_SHIFT: u32 = 9;
pub const CONFIG_SFW_MAX: u32 = 0xf << CONFIG_SFW_SHIFT;
pub const CONFIG_CLKREF_MASK: u32 = 0x0000_01ff;

pub const MASTERADDR_ADDR_MASK: u32 = 0x0000_07ff;
pub const MASTERADDR_ADDR_SHIFT: u32 = 1;

/// Interrupt cause reported in bits 8..12 of the status register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IrqCause {
    /// Code 0: nothing latched.
    None,
    ArbitrationLost,
    NoAck,
    TxData,
    RxData,
    CmdAck,
    Unknown(u8),
}

impl IrqCause {
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::ArbitrationLost,
            2 => Self::NoAck,
            3 => Self::TxData,
            4 => Self::RxData,
            5 => Self::CmdAck,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::ArbitrationLost => 1,
            Self::NoAck => 2,
            Self::TxData => 3,
            Self::RxData => 4,
            Self::CmdAck => 5,
            Self::Unknown(code) => code,
        }
    }
}

/// Decoded view of a status register read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn master_locked(self) -> bool {
        self.0 & STATUS_MASTER_LOCK != 0
    }

    #[must_use]
    pub const fn bus_busy(self) -> bool {
        self.0 & STATUS_BUS_BUSY != 0
    }

    #[must_use]
    pub const fn rx_available(self) -> bool {
        self.0 & STATUS_RX_AVAILABLE != 0
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn cause(self) -> IrqCause {
        IrqCause::from_code(((self.0 & STATUS_IRQ_MASK) >> STATUS_IRQ_SHIFT) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn rx_data(self) -> u8 {
        (self.0 & STATUS_RX_DATA_MASK) as u8
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressingMode {
    SevenBit,
    TenBit,
}

/// Encodes the master address register for `addr`.
#[must_use]
pub const fn master_address_word(addr: u16, mode: AddressingMode) -> u32 {
    let reg = (addr as u32 & MASTERADDR_ADDR_MASK) << MASTERADDR_ADDR_SHIFT;
    match mode {
        AddressingMode::SevenBit => reg,
        AddressingMode::TenBit => reg | 1,
    }
}

/// Raw 32-bit access to the controller registers.
///
/// Accesses go through `&self`: the register block is shared between the
/// transfer path and the interrupt handler. Implementations perform no
/// retries and no interpretation.
pub trait Registers {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);

    /// Reading the status acknowledges the currently latched interrupt.
    fn read_status(&self) -> Status {
        Status(self.read32(I2C_STATUS))
    }

    fn write_command(&self, word: u32) {
        self.write32(I2C_CMD, word);
    }

    fn write_master_address(&self, addr: u16, mode: AddressingMode) {
        self.write32(I2C_MASTERADDR, master_address_word(addr, mode));
    }

    fn read_master_address(&self) -> u32 {
        self.read32(I2C_MASTERADDR)
    }

    fn read_config(&self) -> u32 {
        self.read32(I2C_CONFIG)
    }

    fn write_config(&self, value: u32) {
        self.write32(I2C_CONFIG, value);
    }
}

impl<R: Registers + ?Sized> Registers for &R {
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }
    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }
}

/// Memory-mapped register block at a fixed base address.
#[derive(Copy, Clone, Debug)]
pub struct RegisterBlock {
    base: NonNull<u32>,
}

// SAFETY: the block is a plain MMIO address. Every access is a single volatile
// 32-bit load or store, which the hardware serializes.
unsafe impl Send for RegisterBlock {}
// SAFETY: see above.
unsafe impl Sync for RegisterBlock {}

impl RegisterBlock {
    /// # Safety
    ///
    /// `base` must point at the mapped controller registers and stay valid
    /// for the lifetime of every copy of the returned block.
    pub unsafe fn new(base: *mut u32) -> Result<Self, Error> {
        NonNull::new(base)
            .map(|base| Self { base })
            .ok_or(Error::ResourceUnavailable)
    }
}

impl Registers for RegisterBlock {
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: offsets come from the register map above, all within the block.
        unsafe { read_volatile(self.base.as_ptr().byte_add(offset)) }
    }

    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: see `read32`.
        unsafe { write_volatile(self.base.as_ptr().byte_add(offset), value) }
    }
}
