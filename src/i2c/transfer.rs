// Licensed under the Apache-2.0 license

//! Message descriptors and the transfer state machine.

use crate::common::Logger;
use crate::i2c::bitbang::{self, BusLines};
use crate::i2c::completion::{CompletionState, Event};
use crate::i2c::ns9xxx_i2c::{Error, Ns9xxxI2c};
use crate::i2c::registers::{cmd, AddressingMode, Registers};
use crate::i2c::system_setup::ControllerPlatform;
use crate::i2c_log;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{AddressMode, SevenBitAddress, TenBitAddress};

/// Operations one `transaction` call can carry.
pub const MAX_OPERATIONS: usize = 16;

pub enum Payload<'b> {
    Read(&'b mut [u8]),
    Write(&'b [u8]),
}

/// One segment of a transfer. The buffer is borrowed for the call only.
pub struct Message<'b> {
    pub address: u16,
    pub mode: AddressingMode,
    /// Continue the previous segment without a new START and address.
    pub no_start: bool,
    pub payload: Payload<'b>,
}

impl<'b> Message<'b> {
    #[must_use]
    pub fn read(address: u16, buf: &'b mut [u8]) -> Self {
        Self {
            address,
            mode: AddressingMode::SevenBit,
            no_start: false,
            payload: Payload::Read(buf),
        }
    }

    #[must_use]
    pub fn write(address: u16, bytes: &'b [u8]) -> Self {
        Self {
            address,
            mode: AddressingMode::SevenBit,
            no_start: false,
            payload: Payload::Write(bytes),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: AddressingMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn ten_bit(self) -> Self {
        self.with_mode(AddressingMode::TenBit)
    }

    #[must_use]
    pub fn continued(mut self) -> Self {
        self.no_start = true;
        self
    }

    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self.payload, Payload::Read(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Read(buf) => buf.len(),
            Payload::Write(bytes) => bytes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Address types accepted by the master traits.
pub trait BusAddress: AddressMode + Copy {
    fn target(self) -> (u16, AddressingMode);
}

impl BusAddress for SevenBitAddress {
    fn target(self) -> (u16, AddressingMode) {
        (u16::from(self), AddressingMode::SevenBit)
    }
}

impl BusAddress for TenBitAddress {
    fn target(self) -> (u16, AddressingMode) {
        (self, AddressingMode::TenBit)
    }
}

/// A failed transfer and how many messages completed before it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransferError {
    pub error: Error,
    pub completed: usize,
}

impl embedded_hal::i2c::Error for TransferError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        embedded_hal::i2c::Error::kind(&self.error)
    }
}

impl<R, B, P, D, E, L> Ns9xxxI2c<'_, R, B, P, D, E, L>
where
    R: Registers,
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    E: Event,
    L: Logger,
{
    /// Runs `msgs` in order and returns how many completed.
    ///
    /// Arbitration loss restarts the sequence from the first message, at most
    /// `arbitration_retries` times. Any other failure ends the transfer. A
    /// STOP is sent afterwards in every case except an exhausted retry budget.
    pub fn transfer(&mut self, msgs: &mut [Message<'_>]) -> Result<usize, TransferError> {
        self.completion.set_state(CompletionState::Ok);
        self.retries_used = 0;
        let mut retries_left = self.config.arbitration_retries;
        let mut index = 0;
        let mut outcome = Ok(());

        while let Some(msg) = msgs.get_mut(index) {
            if self.completion.state() == CompletionState::Retry {
                let stopped = self.send_command(cmd::STOP);
                if stopped.is_err() || retries_left == 0 {
                    i2c_log!(
                        self.logger,
                        warn,
                        "i2c: giving up after {} arbitration restarts",
                        self.retries_used
                    );
                    self.completion.set_cursor(None);
                    return Err(TransferError {
                        error: Error::Io,
                        completed: index,
                    });
                }
                retries_left -= 1;
                self.retries_used += 1;
            }

            match self.run_message(msg) {
                Ok(()) => index += 1,
                Err(Error::ArbitrationLoss) => index = 0,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.finish();
        self.completion.set_cursor(None);

        outcome
            .map(|()| index)
            .map_err(|error| TransferError {
                error,
                completed: index,
            })
    }

    fn run_message(&mut self, msg: &mut Message<'_>) -> Result<(), Error> {
        let (address, mode) = (msg.address, msg.mode);
        let readdress = !msg.no_start;

        match &mut msg.payload {
            Payload::Read(buf) => {
                self.completion.set_cursor(Some(0));
                if buf.is_empty() {
                    return self.probe(address, mode);
                }
                let mut from = 0;
                if readdress {
                    self.regs.write_master_address(address, mode);
                    self.send_command(cmd::READ)?;
                    self.commit(buf);
                    from = 1;
                }
                self.read_bytes(buf, from)
            }
            Payload::Write(bytes) => {
                self.completion.set_cursor(None);
                let Some((&first, rest)) = bytes.split_first() else {
                    return self.probe(address, mode);
                };
                if !readdress {
                    return self.write_bytes(bytes);
                }
                self.regs.write_master_address(address, mode);
                self.send_command(cmd::transmit(cmd::WRITE, first))?;
                self.write_bytes(rest)
            }
        }
    }

    fn probe(&mut self, address: u16, mode: AddressingMode) -> Result<(), Error> {
        bitbang::probe_address(
            &mut self.lines,
            &mut self.platform,
            &mut self.delay,
            &mut self.logger,
            address,
            mode,
            self.config.probe_levels,
        )
    }

    /// Closes the transfer with a STOP, escalating to NOP + STOP and then a
    /// GPIO bus reset.
    fn finish(&mut self) {
        if self.send_command(cmd::STOP).is_ok() {
            return;
        }
        i2c_log!(
            self.logger,
            warn,
            "i2c: interface seems to be stuck, trying to unlock (state {:?})",
            self.completion.state()
        );
        let _ = self.send_command(cmd::NOP);
        if self.send_command(cmd::STOP).is_err() {
            i2c_log!(self.logger, warn, "i2c: interface still stuck, forcing bus reset using GPIO");
            self.reset_bus();
        }
    }
}
