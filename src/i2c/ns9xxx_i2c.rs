// Licensed under the Apache-2.0 license

//! NS9xxx I2C master driver.
//!
//! The controller executes one bus command at a time and raises one interrupt
//! when it is done. [`Ns9xxxI2c`] issues the command, sleeps on the shared
//! [`Completion`] cell until the interrupt handler has classified the result,
//! and escalates through lock polling, controller reinitialization and a GPIO
//! bus reset when the master state machine wedges.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::bitbang::{self, BusLines, BusResetReport};
use crate::i2c::common::{Functionality, I2cConfig, I2cSpeed};
use crate::i2c::completion::{Completion, CompletionState, Event, PollEvent};
use crate::i2c::registers::{cmd, Registers, CONFIG_IRQ_DISABLE, CONFIG_SFW_MAX};
use crate::i2c::system_setup::{ControllerPlatform, I2cSystemSetup};
use crate::i2c::traits::{I2cHardwareCore, I2cMaster};
use crate::i2c::transfer::{BusAddress, Message, MAX_OPERATIONS};
use crate::i2c_log;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation};
use fugit::HertzU32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A command or the busy wait ran past its deadline.
    Timeout,
    ArbitrationLoss,
    /// The addressed device did not acknowledge.
    NoAcknowledge,
    /// The controller reported an unexpected interrupt cause.
    Protocol,
    /// Arbitration retries exhausted, or the retry STOP failed.
    Io,
    /// The bit-bang probe saw no acknowledge.
    NoDevice,
    /// Only 100 kHz and 400 kHz can be programmed.
    InvalidSpeed,
    /// More operations than one transaction can carry.
    Invalid,
    Gpio,
    ResourceUnavailable,
}

impl Error {
    fn from_state(state: CompletionState) -> Self {
        match state {
            CompletionState::Retry => Error::ArbitrationLoss,
            CompletionState::Abort => Error::NoAcknowledge,
            CompletionState::Awaiting | CompletionState::Ok | CompletionState::Error => {
                Error::Protocol
            }
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::ArbitrationLoss => ErrorKind::ArbitrationLoss,
            Error::NoAcknowledge => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::NoDevice => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Error::Protocol | Error::Gpio => ErrorKind::Bus,
            Error::Timeout
            | Error::Io
            | Error::InvalidSpeed
            | Error::Invalid
            | Error::ResourceUnavailable => ErrorKind::Other,
        }
    }
}

/// Controller handle.
///
/// `regs` and `completion` are shared with the interrupt handler, which must
/// call [`Completion::on_interrupt`] with the same register block.
pub struct Ns9xxxI2c<'a, R, B, P, D, E = PollEvent, L = NoOpLogger>
where
    R: Registers,
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    E: Event,
    L: Logger,
{
    pub(crate) regs: R,
    pub(crate) completion: &'a Completion<E>,
    pub(crate) lines: B,
    pub(crate) platform: P,
    pub(crate) delay: D,
    pub(crate) config: I2cConfig,
    pub(crate) logger: L,
    pub(crate) retries_used: u8,
}

impl<'a, R, B, P, D, E, L> Ns9xxxI2c<'a, R, B, P, D, E, L>
where
    R: Registers,
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    E: Event,
    L: Logger,
{
    pub fn new(
        regs: R,
        completion: &'a Completion<E>,
        lines: B,
        platform: P,
        delay: D,
        config: I2cConfig,
        logger: L,
    ) -> Self {
        Self {
            regs,
            completion,
            lines,
            platform,
            delay,
            config,
            logger,
            retries_used: 0,
        }
    }

    /// Brings the controller up: pins in hardware mode, interrupt masked in
    /// the controller while the divider is programmed, then unmasked.
    pub fn init(&mut self) {
        self.lines.restore_hardware_mode();
        self.regs.write_config(CONFIG_IRQ_DISABLE | CONFIG_SFW_MAX);
        self.set_clock(self.config.bus_speed());
        self.platform.enable_irq();
        self.clear_irq_disable();
    }

    fn clear_irq_disable(&mut self) {
        let config = self.regs.read_config();
        self.regs.write_config(config & !CONFIG_IRQ_DISABLE);
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Capabilities reported to the transfer layer.
    #[must_use]
    pub fn functionality(&self) -> Functionality {
        Functionality::I2C
            | Functionality::TEN_BIT_ADDR
            | Functionality::SMBUS_QUICK
            | Functionality::SMBUS_BYTE
            | Functionality::SMBUS_BYTE_DATA
            | Functionality::SMBUS_WORD_DATA
    }

    /// Arbitration restarts consumed by the last transfer.
    #[must_use]
    pub fn last_retries(&self) -> u8 {
        self.retries_used
    }

    /// Programs the divider for `speed` and returns the configuration word.
    pub fn set_clock(&mut self, speed: I2cSpeed) -> u32 {
        let source = I2cSystemSetup::source_frequency(&self.platform);
        let config = I2cSystemSetup::clock_config(
            self.regs.read_config(),
            source,
            speed,
            self.config.scl_delay,
        );
        self.regs.write_config(config);
        i2c_log!(
            self.logger,
            info,
            "i2c: bus frequency set to {}, source clock = {}, scl_delay = {}, config -> {:#x}",
            speed.hz(),
            source.raw(),
            self.config.scl_delay,
            config
        );
        config
    }

    /// Selects the bus frequency. Only 100 kHz and 400 kHz are accepted.
    pub fn set_frequency(&mut self, freq: HertzU32) -> Result<u32, Error> {
        let Some(speed) = I2cSpeed::from_hz(freq.raw()) else {
            i2c_log!(
                self.logger,
                warn,
                "i2c: unsupported clock {} Hz, use 100 kHz or 400 kHz",
                freq.raw()
            );
            return Err(Error::InvalidSpeed);
        };
        self.config.speed = Some(speed);
        Ok(self.set_clock(speed))
    }

    /// Issues one command and waits for its completion interrupt.
    pub(crate) fn send_command(&mut self, word: u32) -> Result<(), Error> {
        if self.regs.read_status().master_locked() {
            if let Err(e) = self.wait_while_busy() {
                i2c_log!(self.logger, warn, "i2c: timeout waiting for master module to unlock");
                return Err(e);
            }
        }

        self.completion.issue(&self.regs, word);

        let timeout = self.config.timeouts.command;
        if !self.completion.wait(&mut self.delay, timeout) {
            i2c_log!(
                self.logger,
                warn,
                "i2c: timeout waiting for interrupt (cmd = {:#x}, timeout = {} ms)",
                word,
                timeout.to_millis()
            );
            self.completion.abandon();
            if self.wait_while_busy().is_ok() {
                // the command is not reissued
                i2c_log!(self.logger, warn, "i2c: bus seems free after waiting, but not retrying");
            }
            return Err(Error::Timeout);
        }

        match self.completion.state() {
            CompletionState::Ok => Ok(()),
            state => {
                i2c_log!(self.logger, warn, "i2c: state {:?} != Ok after cmd {:#x}", state, word);
                Err(Error::from_state(state))
            }
        }
    }

    /// Copies the byte latched by the last receive interrupt into `buf`.
    pub(crate) fn commit(&self, buf: &mut [u8]) {
        if let Some((at, byte)) = self.completion.take_latched() {
            if let Some(slot) = buf.get_mut(at) {
                *slot = byte;
            }
        }
    }

    /// Fills `buf[from..]`, one NOP-driven receive per byte.
    pub(crate) fn read_bytes(&mut self, buf: &mut [u8], from: usize) -> Result<(), Error> {
        for at in from..buf.len() {
            self.completion.set_cursor(Some(at));
            self.send_command(cmd::NOP)?;
            self.commit(buf);
        }
        Ok(())
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        for &byte in bytes {
            self.send_command(cmd::transmit(cmd::NOP, byte))?;
        }
        Ok(())
    }

    /// Waits for the master-command lock to clear.
    ///
    /// Each attempt polls for the busy window; an expired attempt reinitializes
    /// the controller before the next one.
    pub fn wait_while_busy(&mut self) -> Result<(), Error> {
        if !self.regs.read_status().master_locked() {
            return Ok(());
        }

        let poll_ms = self.config.timeouts.busy_poll.to_millis().max(1);
        let polls = self.config.timeouts.busy_window.to_millis().div_ceil(poll_ms);
        let attempts = self.config.busy_attempts;

        for attempt in 1..=attempts {
            for _ in 0..polls {
                if !self.regs.read_status().master_locked() {
                    self.delay.delay_ms(poll_ms);
                    let status = self.regs.read_status();
                    i2c_log!(
                        self.logger,
                        debug,
                        "i2c: master module idle (status {:#x})",
                        status.bits()
                    );
                    return Ok(());
                }
                self.delay.delay_ms(poll_ms);
            }
            i2c_log!(
                self.logger,
                warn,
                "i2c: timed out waiting for master module to unlock, attempt {}",
                attempt
            );
            self.reinit();
        }

        i2c_log!(self.logger, error, "i2c: giving up after {} attempts to reset the bus", attempts);
        Err(Error::Timeout)
    }

    /// Resets the bus and, if the master is still locked, reprograms the
    /// controller from scratch.
    pub(crate) fn reinit(&mut self) {
        self.reset_bus();

        let status = self.regs.read_status();
        if !status.master_locked() {
            i2c_log!(self.logger, debug, "i2c: master module idle (status {:#x})", status.bits());
            return;
        }

        i2c_log!(
            self.logger,
            warn,
            "i2c: master module still locked (status {:#x}), reinitialising controller",
            status.bits()
        );
        self.platform.disable_irq();
        self.regs.write_config(CONFIG_IRQ_DISABLE | CONFIG_SFW_MAX);
        self.set_clock(self.config.bus_speed());
        self.platform.enable_irq();
        self.clear_irq_disable();
    }

    /// Full GPIO bus reset followed by a register dump.
    pub fn reset_bus(&mut self) -> BusResetReport {
        let regs = &self.regs;
        let (report, (status, master, config)) = bitbang::reset_bus_then(
            &mut self.lines,
            &mut self.platform,
            &mut self.delay,
            &mut self.logger,
            || (regs.read_status(), regs.read_master_address(), regs.read_config()),
        );

        i2c_log!(
            self.logger,
            warn,
            "i2c: STATUS {:#x}, MASTERADDR {:#x}, CONFIG {:#x}, state {:?}",
            status.bits(),
            master,
            config,
            self.completion.state()
        );
        report
    }
}

impl<R, B, P, D, E, L> I2cHardwareCore for Ns9xxxI2c<'_, R, B, P, D, E, L>
where
    R: Registers,
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    E: Event,
    L: Logger,
{
    type Error = Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        Ns9xxxI2c::init(self);
        Ok(())
    }

    fn configure_timing(&mut self, speed: I2cSpeed) -> Result<u32, Self::Error> {
        self.config.speed = Some(speed);
        Ok(self.set_clock(speed))
    }

    fn recover_bus(&mut self) -> Result<(), Self::Error> {
        if self.reset_bus().idle_after {
            Ok(())
        } else {
            Err(Error::Io)
        }
    }

    fn functionality(&self) -> Functionality {
        Ns9xxxI2c::functionality(self)
    }
}

impl<A, R, B, P, D, E, L> I2cMaster<A> for Ns9xxxI2c<'_, R, B, P, D, E, L>
where
    A: BusAddress,
    R: Registers,
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    E: Event,
    L: Logger,
{
    fn write(&mut self, addr: A, bytes: &[u8]) -> Result<(), Self::Error> {
        let (address, mode) = addr.target();
        let mut msgs = [Message::write(address, bytes).with_mode(mode)];
        self.transfer(&mut msgs).map(drop).map_err(|e| e.error)
    }

    fn read(&mut self, addr: A, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let (address, mode) = addr.target();
        let mut msgs = [Message::read(address, buffer).with_mode(mode)];
        self.transfer(&mut msgs).map(drop).map_err(|e| e.error)
    }

    fn write_read(&mut self, addr: A, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        let (address, mode) = addr.target();
        let mut msgs = [
            Message::write(address, bytes).with_mode(mode),
            Message::read(address, buffer).with_mode(mode),
        ];
        self.transfer(&mut msgs).map(drop).map_err(|e| e.error)
    }

    fn transaction_slice(
        &mut self,
        addr: A,
        ops_slice: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let (address, mode) = addr.target();
        let mut msgs: heapless::Vec<Message<'_>, MAX_OPERATIONS> = heapless::Vec::new();
        let mut previous_read = None;
        for op in ops_slice.iter_mut() {
            let msg = match op {
                Operation::Read(buf) => Message::read(address, buf),
                Operation::Write(bytes) => Message::write(address, bytes),
            }
            .with_mode(mode);
            let is_read = msg.is_read();
            let msg = if previous_read == Some(is_read) {
                msg.continued()
            } else {
                msg
            };
            previous_read = Some(is_read);
            msgs.push(msg).map_err(|_| Error::Invalid)?;
        }
        self.transfer(&mut msgs).map(drop).map_err(|e| e.error)
    }
}
