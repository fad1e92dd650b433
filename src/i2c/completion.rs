// Licensed under the Apache-2.0 license

//! Completion handshake between the command issuer and the interrupt handler.
//!
//! Every command written to the controller is answered by exactly one
//! interrupt. The handler classifies the interrupt cause and pushes the result
//! into a single-slot cell; the issuer blocks on an [`Event`] until the slot
//! leaves [`CompletionState::Awaiting`] or its timeout expires.
//!
//! The slot is guarded by a `critical_section::Mutex`, so the handler and the
//! issuer never observe a torn state/cursor pair. A received byte is latched
//! together with the cursor position it belongs to and copied into the
//! caller's buffer by the issuer once the command has completed, which keeps
//! the caller's buffer out of interrupt context.

use crate::i2c::registers::{cmd, IrqCause, Registers};
use core::cell::Cell;
use core::convert::Infallible;
use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use fugit::MillisDurationU32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompletionState {
    /// A command is outstanding. The only state the handler acts in.
    Awaiting,
    Ok,
    /// Arbitration was lost; the transfer restarts from its first message.
    Retry,
    /// The controller reported an unexpected cause.
    Error,
    /// The addressed device did not acknowledge. A STOP has been issued.
    Abort,
}

#[derive(Copy, Clone, Debug)]
struct Slot {
    state: CompletionState,
    cursor: Option<usize>,
    latched: Option<(usize, u8)>,
}

impl Slot {
    const IDLE: Slot = Slot {
        state: CompletionState::Ok,
        cursor: None,
        latched: None,
    };
}

/// Blocking primitive used while a command is outstanding.
pub trait Event {
    /// Suspends the caller until `ready` returns true or `timeout` elapses.
    ///
    /// Returns the final value of `ready`. An implementation may also return
    /// early to cancel the wait. The driver cannot tell a cancelled wait from
    /// an expired one: both surface as [`Error::Timeout`] and run the usual
    /// busy-lock recovery before the caller sees the error.
    ///
    /// [`Error::Timeout`]: crate::i2c::ns9xxx_i2c::Error::Timeout
    fn wait<D: DelayNs>(
        &self,
        delay: &mut D,
        timeout: MillisDurationU32,
        ready: impl FnMut() -> bool,
    ) -> bool;

    /// Wakes one waiter. Called from interrupt context.
    fn notify_one(&self);
}

/// Sleep granularity of [`PollEvent`].
pub const POLL_STEP_US: u32 = 100;

/// Event for bare-metal targets: sleeps on the delay provider between checks.
#[derive(Copy, Clone, Debug, Default)]
pub struct PollEvent;

impl Event for PollEvent {
    fn wait<D: DelayNs>(
        &self,
        delay: &mut D,
        timeout: MillisDurationU32,
        mut ready: impl FnMut() -> bool,
    ) -> bool {
        let budget = u64::from(timeout.to_millis()) * 1_000;
        let mut waited = 0u64;
        loop {
            if ready() {
                return true;
            }
            if waited >= budget {
                return false;
            }
            delay.delay_us(POLL_STEP_US);
            waited += u64::from(POLL_STEP_US);
        }
    }

    fn notify_one(&self) {}
}

/// Event backed by a condition variable, for hosted targets.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Default)]
pub struct StdEvent {
    lock: std::sync::Mutex<()>,
    cond: std::sync::Condvar,
}

#[cfg(any(test, feature = "std"))]
impl StdEvent {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock: std::sync::Mutex::new(()),
            cond: std::sync::Condvar::new(),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl Event for StdEvent {
    fn wait<D: DelayNs>(
        &self,
        _delay: &mut D,
        timeout: MillisDurationU32,
        mut ready: impl FnMut() -> bool,
    ) -> bool {
        let Ok(guard) = self.lock.lock() else {
            return ready();
        };
        let timeout = std::time::Duration::from_millis(u64::from(timeout.to_millis()));
        let result = self.cond.wait_timeout_while(guard, timeout, |_| !ready());
        drop(result);
        ready()
    }

    fn notify_one(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_one();
    }
}

/// Single-slot completion cell shared with the interrupt handler.
///
/// Lives for as long as the controller is attached, typically in a `static`:
///
/// ```rust,ignore
/// static COMPLETION: Completion = Completion::new(PollEvent);
///
/// fn i2c_irq() {
///     COMPLETION.on_interrupt(&REGS);
/// }
/// ```
pub struct Completion<E = PollEvent> {
    slot: Mutex<Cell<Slot>>,
    event: E,
}

impl<E> Completion<E> {
    pub const fn new(event: E) -> Self {
        Self {
            slot: Mutex::new(Cell::new(Slot::IDLE)),
            event,
        }
    }

    fn update<T>(&self, f: impl FnOnce(&mut Slot) -> T) -> T {
        critical_section::with(|cs| {
            let cell = self.slot.borrow(cs);
            let mut slot = cell.get();
            let out = f(&mut slot);
            cell.set(slot);
            out
        })
    }

    #[must_use]
    pub fn state(&self) -> CompletionState {
        critical_section::with(|cs| self.slot.borrow(cs).get().state)
    }

    pub(crate) fn set_state(&self, state: CompletionState) {
        self.update(|slot| slot.state = state);
    }

    /// Points the receive cursor at `at` in the current read buffer.
    pub(crate) fn set_cursor(&self, at: Option<usize>) {
        self.update(|slot| {
            slot.cursor = at;
            slot.latched = None;
        });
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        critical_section::with(|cs| self.slot.borrow(cs).get().cursor)
    }

    pub(crate) fn take_latched(&self) -> Option<(usize, u8)> {
        self.update(|slot| slot.latched.take())
    }

    /// Arms the slot and writes `word` to the command register.
    ///
    /// Both happen inside one critical section so the completion interrupt
    /// cannot be classified before the slot reads `Awaiting`.
    pub(crate) fn issue<R: Registers>(&self, regs: &R, word: u32) {
        critical_section::with(|cs| {
            let cell = self.slot.borrow(cs);
            let mut slot = cell.get();
            slot.state = CompletionState::Awaiting;
            slot.latched = None;
            cell.set(slot);
            regs.write_command(word);
        });
    }

    /// Moves an unanswered command out of `Awaiting` so a late interrupt is
    /// treated as spurious.
    pub(crate) fn abandon(&self) {
        self.update(|slot| {
            if slot.state == CompletionState::Awaiting {
                slot.state = CompletionState::Error;
            }
        });
    }

    /// Non-blocking check of the outstanding command.
    pub fn poll(&self) -> nb::Result<CompletionState, Infallible> {
        match self.state() {
            CompletionState::Awaiting => Err(nb::Error::WouldBlock),
            state => Ok(state),
        }
    }
}

impl<E: Event> Completion<E> {
    /// Blocks until the outstanding command completes or `timeout` expires.
    pub(crate) fn wait<D: DelayNs>(&self, delay: &mut D, timeout: MillisDurationU32) -> bool {
        self.event.wait(delay, timeout, || self.poll().is_ok())
    }

    /// Interrupt handler body.
    ///
    /// Reads the status register once, which acknowledges the interrupt, and
    /// classifies its cause. Returns the new state, or `None` when no command
    /// was awaiting completion. Never blocks and never allocates.
    pub fn on_interrupt<R: Registers>(&self, regs: &R) -> Option<CompletionState> {
        let status = regs.read_status();

        if self.state() != CompletionState::Awaiting {
            return None;
        }

        let next = critical_section::with(|cs| {
            let cell = self.slot.borrow(cs);
            let mut slot = cell.get();
            if slot.state != CompletionState::Awaiting {
                return None;
            }
            slot.state = match status.cause() {
                IrqCause::RxData => {
                    if let Some(at) = slot.cursor {
                        slot.latched = Some((at, status.rx_data()));
                    }
                    CompletionState::Ok
                }
                IrqCause::CmdAck | IrqCause::TxData => CompletionState::Ok,
                IrqCause::NoAck => {
                    regs.write_command(cmd::STOP);
                    CompletionState::Abort
                }
                IrqCause::ArbitrationLost => CompletionState::Retry,
                IrqCause::None | IrqCause::Unknown(_) => CompletionState::Error,
            };
            cell.set(slot);
            Some(slot.state)
        });

        if next.is_some() {
            self.event.notify_one();
        }
        next
    }
}
