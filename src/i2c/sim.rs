// Licensed under the Apache-2.0 license

//! Host-side stand-ins for the controller, its interrupt line and the GPIOs.
//!
//! `SimRegs` answers every command written outside interrupt context with one
//! scripted interrupt. `SimDelay` keeps virtual time and delivers that
//! interrupt to an attached [`Completion`] the next time the driver sleeps,
//! unless the platform has masked the line.

use crate::common::test_log::RecordingLogger;
use crate::i2c::bitbang::{BusLines, FlexLine};
use crate::i2c::common::I2cConfig;
use crate::i2c::completion::{Completion, PollEvent};
use crate::i2c::ns9xxx_i2c::Ns9xxxI2c;
use crate::i2c::registers::{
    cmd, IrqCause, Registers, CONFIG_IRQ_DISABLE, CONFIG_SFW_MAX, I2C_CMD, I2C_CONFIG,
    I2C_MASTERADDR, I2C_STATUS, STATUS_MASTER_LOCK,
};
use crate::i2c::system_setup::ControllerPlatform;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorType, InputPin, OutputPin, PinState};
use fugit::HertzU32;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

pub const SIM_CLOCK_HZ: u32 = 176_947_200;

/// Interrupt raised in answer to one command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Cause(IrqCause),
    Rx(u8),
    /// No interrupt at all.
    Silent,
}

#[derive(Default)]
struct SimState {
    status: u32,
    pending: Option<u32>,
    replies: VecDeque<Reply>,
    rx: VecDeque<u8>,
    commands: Vec<u32>,
    master_addresses: Vec<u32>,
    config: u32,
    config_writes: Vec<u32>,
    /// Interrupt mask state at each STATUS read.
    status_read_masks: Vec<bool>,
    locked_reads: u32,
    hold_lock: bool,
    release_on_reinit: bool,
    in_isr: bool,
    masked: bool,
}

impl SimState {
    fn default_reply(&mut self, word: u32) -> Reply {
        if word & cmd::TX_VALID != 0 {
            return Reply::Cause(IrqCause::TxData);
        }
        match word & 0x0700 {
            cmd::NOP | cmd::READ => self
                .rx
                .pop_front()
                .map_or(Reply::Cause(IrqCause::CmdAck), Reply::Rx),
            _ => Reply::Cause(IrqCause::CmdAck),
        }
    }
}

#[derive(Clone, Default)]
pub struct SimRegs(Rc<RefCell<SimState>>);

impl SimRegs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches a status word as if an interrupt had just been raised.
    pub fn latch(&self, cause: IrqCause, data: u8) {
        let mut s = self.0.borrow_mut();
        s.status = (u32::from(cause.code()) << 8) | u32::from(data);
        s.pending = None;
    }

    /// Queues replies consumed ahead of the defaults.
    pub fn script(&self, replies: &[Reply]) {
        self.0.borrow_mut().replies.extend(replies.iter().copied());
    }

    /// Bytes returned by successive READ and NOP commands.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// The next `reads` status reads report the master-command lock.
    pub fn lock_for(&self, reads: u32) {
        self.0.borrow_mut().locked_reads = reads;
    }

    /// Keeps the lock bit set, optionally until the controller is reprogrammed.
    pub fn hold_lock(&self, release_on_reinit: bool) {
        let mut s = self.0.borrow_mut();
        s.hold_lock = true;
        s.release_on_reinit = release_on_reinit;
    }

    pub fn commands(&self) -> Vec<u32> {
        self.0.borrow().commands.clone()
    }

    pub fn master_addresses(&self) -> Vec<u32> {
        self.0.borrow().master_addresses.clone()
    }

    pub fn set_config(&self, value: u32) {
        self.0.borrow_mut().config = value;
    }

    pub fn config_writes(&self) -> Vec<u32> {
        self.0.borrow().config_writes.clone()
    }

    pub fn status_read_masks(&self) -> Vec<bool> {
        self.0.borrow().status_read_masks.clone()
    }

    pub fn masked(&self) -> bool {
        self.0.borrow().masked
    }

    fn set_masked(&self, masked: bool) {
        self.0.borrow_mut().masked = masked;
    }

    /// Moves the pending interrupt into the status register, if deliverable.
    fn raise(&self) -> bool {
        let mut s = self.0.borrow_mut();
        if s.masked {
            return false;
        }
        match s.pending.take() {
            Some(status) => {
                s.status = status;
                s.in_isr = true;
                true
            }
            None => false,
        }
    }

    fn leave_isr(&self) {
        self.0.borrow_mut().in_isr = false;
    }
}

impl Registers for SimRegs {
    fn read32(&self, offset: usize) -> u32 {
        let mut s = self.0.borrow_mut();
        match offset {
            I2C_STATUS => {
                let masked = s.masked;
                s.status_read_masks.push(masked);
                let locked = if s.hold_lock {
                    true
                } else if s.locked_reads > 0 {
                    s.locked_reads -= 1;
                    true
                } else {
                    false
                };
                s.status | if locked { STATUS_MASTER_LOCK } else { 0 }
            }
            I2C_MASTERADDR => s.master_addresses.last().copied().unwrap_or(0),
            I2C_CONFIG => s.config,
            _ => 0,
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut s = self.0.borrow_mut();
        match offset {
            I2C_CMD => {
                s.commands.push(value);
                if !s.in_isr {
                    let reply = match s.replies.pop_front() {
                        Some(reply) => reply,
                        None => s.default_reply(value),
                    };
                    s.pending = match reply {
                        Reply::Cause(cause) => Some(u32::from(cause.code()) << 8),
                        Reply::Rx(byte) => Some((4 << 8) | u32::from(byte)),
                        Reply::Silent => None,
                    };
                }
            }
            I2C_MASTERADDR => s.master_addresses.push(value),
            I2C_CONFIG => {
                s.config = value;
                s.config_writes.push(value);
                if s.release_on_reinit && value == CONFIG_IRQ_DISABLE | CONFIG_SFW_MAX {
                    s.hold_lock = false;
                }
            }
            _ => {}
        }
    }
}

/// Virtual-time delay that doubles as the interrupt line.
pub struct SimDelay<'c> {
    regs: SimRegs,
    completion: Option<&'c Completion>,
    elapsed_ns: u64,
}

impl<'c> SimDelay<'c> {
    pub fn new(regs: SimRegs) -> Self {
        Self {
            regs,
            completion: None,
            elapsed_ns: 0,
        }
    }

    #[must_use]
    pub fn attach(mut self, completion: &'c Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_ns / 1_000
    }
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
        if let Some(completion) = self.completion {
            if self.regs.raise() {
                completion.on_interrupt(&self.regs);
                self.regs.leave_isr();
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineOp {
    Input,
    Output(PinState),
    Set(PinState),
    Read,
}

#[derive(Copy, Clone, Debug)]
pub struct SimPinError;

impl digital::Error for SimPinError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// Recorded GPIO line. Reads follow a script and read high once it runs out.
#[derive(Clone, Default)]
pub struct SimLine {
    ops: Rc<RefCell<Vec<LineOp>>>,
    levels: Rc<RefCell<VecDeque<bool>>>,
    budget: Rc<Cell<Option<u32>>>,
}

impl SimLine {
    fn record(&self, op: LineOp) -> Result<(), SimPinError> {
        match self.budget.get() {
            Some(0) => return Err(SimPinError),
            Some(n) => self.budget.set(Some(n - 1)),
            None => {}
        }
        self.ops.borrow_mut().push(op);
        Ok(())
    }
}

impl ErrorType for SimLine {
    type Error = SimPinError;
}

impl InputPin for SimLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.record(LineOp::Read)?;
        Ok(self.levels.borrow_mut().pop_front().unwrap_or(true))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl OutputPin for SimLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.record(LineOp::Set(PinState::Low))
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.record(LineOp::Set(PinState::High))
    }
}

impl FlexLine for SimLine {
    fn set_as_input(&mut self) -> Result<(), Self::Error> {
        self.record(LineOp::Input)
    }

    fn set_as_output(&mut self, level: PinState) -> Result<(), Self::Error> {
        self.record(LineOp::Output(level))
    }
}

/// Two recorded lines. Clones share their recordings.
#[derive(Clone)]
pub struct SimBus {
    scl: SimLine,
    sda: SimLine,
    restores: Rc<Cell<u32>>,
}

impl SimBus {
    pub fn new() -> Self {
        let budget = Rc::new(Cell::new(None));
        Self {
            scl: SimLine {
                budget: budget.clone(),
                ..SimLine::default()
            },
            sda: SimLine {
                budget,
                ..SimLine::default()
            },
            restores: Rc::default(),
        }
    }

    pub fn script_scl(&self, levels: &[bool]) {
        self.scl.levels.borrow_mut().extend(levels.iter().copied());
    }

    pub fn script_sda(&self, levels: &[bool]) {
        self.sda.levels.borrow_mut().extend(levels.iter().copied());
    }

    /// Every pin operation after the first `ops` fails.
    pub fn fail_after(&self, ops: u32) {
        self.scl.budget.set(Some(ops));
    }

    pub fn scl_ops(&self) -> Vec<LineOp> {
        self.scl.ops.borrow().clone()
    }

    pub fn sda_ops(&self) -> Vec<LineOp> {
        self.sda.ops.borrow().clone()
    }

    pub fn restores(&self) -> u32 {
        self.restores.get()
    }
}

impl BusLines for SimBus {
    type Scl = SimLine;
    type Sda = SimLine;

    fn scl(&mut self) -> &mut SimLine {
        &mut self.scl
    }

    fn sda(&mut self) -> &mut SimLine {
        &mut self.sda
    }

    fn restore_hardware_mode(&mut self) {
        self.restores.set(self.restores.get() + 1);
    }
}

/// Platform that records interrupt masking and masks the simulated line.
#[derive(Clone)]
pub struct SimPlatform {
    events: Rc<RefCell<Vec<&'static str>>>,
    regs: Option<SimRegs>,
    clock: HertzU32,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self {
            events: Rc::default(),
            regs: None,
            clock: HertzU32::from_raw(SIM_CLOCK_HZ),
        }
    }
}

impl SimPlatform {
    pub fn wired_to(regs: &SimRegs) -> Self {
        Self {
            regs: Some(regs.clone()),
            ..Self::default()
        }
    }

    pub fn irq_events(&self) -> Vec<&'static str> {
        self.events.borrow().clone()
    }
}

impl ControllerPlatform for SimPlatform {
    fn disable_irq(&mut self) {
        self.events.borrow_mut().push("disable");
        if let Some(regs) = &self.regs {
            regs.set_masked(true);
        }
    }

    fn enable_irq(&mut self) {
        self.events.borrow_mut().push("enable");
        if let Some(regs) = &self.regs {
            regs.set_masked(false);
        }
    }

    fn source_clock(&self) -> HertzU32 {
        self.clock
    }
}

pub type SimI2c<'a> =
    Ns9xxxI2c<'a, SimRegs, SimBus, SimPlatform, SimDelay<'a>, PollEvent, RecordingLogger>;

/// Simulated controller plus handles for inspecting it.
pub struct Rig {
    pub regs: SimRegs,
    pub bus: SimBus,
    pub platform: SimPlatform,
    pub log: RecordingLogger,
}

impl Rig {
    pub fn new() -> Self {
        let regs = SimRegs::new();
        Self {
            platform: SimPlatform::wired_to(&regs),
            regs,
            bus: SimBus::new(),
            log: RecordingLogger::default(),
        }
    }

    pub fn controller<'a>(&self, completion: &'a Completion, config: I2cConfig) -> SimI2c<'a> {
        Ns9xxxI2c::new(
            self.regs.clone(),
            completion,
            self.bus.clone(),
            self.platform.clone(),
            SimDelay::new(self.regs.clone()).attach(completion),
            config,
            self.log.clone(),
        )
    }
}
