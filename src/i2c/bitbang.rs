// Licensed under the Apache-2.0 license

//! GPIO bit-bang engine.
//!
//! Takes the SCL and SDA lines away from the I2C peripheral to unstick a hung
//! bus (nine clock pulses plus a forced STOP) or to probe a device address by
//! hand. Both operations run inside a [`BitBangSession`], which masks the
//! controller interrupt and hands the lines back to hardware mode when it is
//! dropped, on every exit path.

use crate::common::Logger;
use crate::i2c::ns9xxx_i2c::Error;
use crate::i2c::registers::AddressingMode;
use crate::i2c::system_setup::ControllerPlatform;
use crate::i2c_log;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

/// Clock pulses driven by a bus reset.
pub const RESET_CLOCK_CYCLES: u32 = 9;

/// Settle time applied around every line transition.
const EDGE_DELAY_MS: u32 = 1;
/// Idle-high time before a probe's START condition.
const PROBE_SETUP_MS: u32 = 10;

/// A GPIO line whose direction can be switched at run time.
///
/// Releasing a line means switching it to input so the bus pull-up takes it
/// high unless a device holds it low.
pub trait FlexLine: InputPin + OutputPin {
    fn set_as_input(&mut self) -> Result<(), Self::Error>;
    fn set_as_output(&mut self, level: PinState) -> Result<(), Self::Error>;
}

/// The two bus lines and the switch back to peripheral mode.
pub trait BusLines {
    type Scl: FlexLine;
    type Sda: FlexLine;

    fn scl(&mut self) -> &mut Self::Scl;
    fn sda(&mut self) -> &mut Self::Sda;

    /// Routes both pins back to the I2C peripheral.
    fn restore_hardware_mode(&mut self);
}

/// [`BusLines`] built from two pins and a pin-mux callback.
pub struct GpioBus<SCL, SDA, F> {
    scl: SCL,
    sda: SDA,
    restore: F,
}

impl<SCL, SDA, F> GpioBus<SCL, SDA, F>
where
    SCL: FlexLine,
    SDA: FlexLine,
    F: FnMut(),
{
    pub fn new(scl: SCL, sda: SDA, restore: F) -> Self {
        Self { scl, sda, restore }
    }

    pub fn release(self) -> (SCL, SDA, F) {
        (self.scl, self.sda, self.restore)
    }
}

impl<SCL, SDA, F> BusLines for GpioBus<SCL, SDA, F>
where
    SCL: FlexLine,
    SDA: FlexLine,
    F: FnMut(),
{
    type Scl = SCL;
    type Sda = SDA;

    fn scl(&mut self) -> &mut SCL {
        &mut self.scl
    }

    fn sda(&mut self) -> &mut SDA {
        &mut self.sda
    }

    fn restore_hardware_mode(&mut self) {
        (self.restore)();
    }
}

/// Scoped ownership of the bus lines.
///
/// Creating a session masks the controller interrupt. Dropping it restores
/// hardware pin mode first and unmasks the interrupt second.
pub struct BitBangSession<'a, B: BusLines, P: ControllerPlatform> {
    lines: &'a mut B,
    platform: &'a mut P,
}

impl<'a, B: BusLines, P: ControllerPlatform> BitBangSession<'a, B, P> {
    pub fn new(lines: &'a mut B, platform: &'a mut P) -> Self {
        platform.disable_irq();
        Self { lines, platform }
    }

    fn release_scl(&mut self) -> Result<(), Error> {
        self.lines.scl().set_as_input().map_err(|_| Error::Gpio)
    }

    fn release_sda(&mut self) -> Result<(), Error> {
        self.lines.sda().set_as_input().map_err(|_| Error::Gpio)
    }

    fn drive_scl(&mut self, level: PinState) -> Result<(), Error> {
        self.lines.scl().set_as_output(level).map_err(|_| Error::Gpio)
    }

    fn drive_sda(&mut self, level: PinState) -> Result<(), Error> {
        self.lines.sda().set_as_output(level).map_err(|_| Error::Gpio)
    }

    fn set_scl(&mut self, level: PinState) -> Result<(), Error> {
        self.lines.scl().set_state(level).map_err(|_| Error::Gpio)
    }

    fn set_sda(&mut self, level: PinState) -> Result<(), Error> {
        self.lines.sda().set_state(level).map_err(|_| Error::Gpio)
    }

    fn scl_high(&mut self) -> Result<bool, Error> {
        self.lines.scl().is_high().map_err(|_| Error::Gpio)
    }

    fn sda_high(&mut self) -> Result<bool, Error> {
        self.lines.sda().is_high().map_err(|_| Error::Gpio)
    }
}

impl<B: BusLines, P: ControllerPlatform> Drop for BitBangSession<'_, B, P> {
    fn drop(&mut self) {
        self.lines.restore_hardware_mode();
        self.platform.enable_irq();
    }
}

/// Line-state diagnostics gathered by [`reset_bus`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusResetReport {
    /// Both lines read high before any clock pulse.
    pub initially_idle: bool,
    /// SDA read low before any clock pulse.
    pub sda_stuck_low: bool,
    /// Pulses that started with SCL released high.
    pub effective_cycles: u32,
    pub sda_transitions: u32,
    /// Both lines read high after the forced STOP.
    pub idle_after: bool,
}

/// Runs the nine-clock unstick sequence followed by a forced STOP.
///
/// Never fails: a pin error is logged and ends the sequence early. Callers
/// re-read the controller status to learn whether the bus recovered.
pub fn reset_bus<B, P, D, L>(
    lines: &mut B,
    platform: &mut P,
    delay: &mut D,
    logger: &mut L,
) -> BusResetReport
where
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    L: Logger,
{
    reset_bus_then(lines, platform, delay, logger, || ()).0
}

/// [`reset_bus`], then runs `inspect` while the interrupt is still masked.
///
/// `inspect` runs after the line sequence and before hardware pin mode is
/// restored, so register reads in it cannot race the interrupt handler.
pub fn reset_bus_then<B, P, D, L, F, T>(
    lines: &mut B,
    platform: &mut P,
    delay: &mut D,
    mut logger: &mut L,
    inspect: F,
) -> (BusResetReport, T)
where
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    L: Logger,
    F: FnOnce() -> T,
{
    let mut report = BusResetReport::default();
    let mut session = BitBangSession::new(lines, platform);
    if let Err(e) = clock_out(&mut session, delay, logger, &mut report) {
        i2c_log!(logger, error, "i2c: bus reset aborted: {:?}", e);
    }
    let inspected = inspect();
    drop(session);
    (report, inspected)
}

fn clock_out<B, P, D, L>(
    session: &mut BitBangSession<'_, B, P>,
    delay: &mut D,
    mut logger: &mut L,
    report: &mut BusResetReport,
) -> Result<(), Error>
where
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    L: Logger,
{
    session.release_scl()?;
    session.release_sda()?;
    delay.delay_ms(EDGE_DELAY_MS);
    let scl = session.scl_high()?;
    let mut sda = session.sda_high()?;

    report.initially_idle = scl && sda;
    report.sda_stuck_low = !sda;
    if report.initially_idle {
        i2c_log!(logger, debug, "i2c: bus reset requested but bus seems idle");
    }
    if !sda {
        i2c_log!(logger, debug, "i2c: SDA seems to be held low externally");
    }

    for cycle in 0..RESET_CLOCK_CYCLES {
        if session.scl_high()? {
            report.effective_cycles += 1;
        } else {
            i2c_log!(logger, debug, "i2c: SCL held low at start of clock cycle {}", cycle);
        }
        session.drive_scl(PinState::Low)?;
        delay.delay_ms(EDGE_DELAY_MS);
        session.release_scl()?;
        delay.delay_ms(EDGE_DELAY_MS);

        let now = session.sda_high()?;
        if now != sda {
            i2c_log!(
                logger,
                debug,
                "i2c: SDA changed from {} to {} after {} clock cycles",
                u8::from(sda),
                u8::from(now),
                cycle
            );
            report.sda_transitions += 1;
            sda = now;
        }
        if !session.scl_high()? {
            i2c_log!(logger, debug, "i2c: SCL held low at end of clock cycle {}", cycle);
            delay.delay_ms(EDGE_DELAY_MS);
        }
    }

    // STOP: SDA rises while SCL is released
    delay.delay_ms(EDGE_DELAY_MS);
    session.release_sda()?;
    delay.delay_ms(EDGE_DELAY_MS);
    let scl = session.scl_high()?;
    let sda = session.sda_high()?;

    if !scl {
        i2c_log!(logger, error, "i2c: SCL seems to be held low externally");
    }
    if !sda {
        i2c_log!(logger, error, "i2c: SDA still held low externally");
    }
    report.idle_after = scl && sda;
    if report.idle_after {
        i2c_log!(logger, debug, "i2c: reset successful, bus seems to be idle");
    } else {
        i2c_log!(
            logger,
            debug,
            "i2c: reset unsuccessful after {} effective cycles",
            report.effective_cycles
        );
    }
    Ok(())
}

/// How the probe drives SDA for each address bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProbeLevels {
    /// Every bit is driven high, matching the deployed controller firmware.
    #[default]
    Legacy,
    /// Each bit is driven to its address value.
    AddressBits,
}

impl ProbeLevels {
    fn level(self, bit_set: bool) -> PinState {
        match self {
            ProbeLevels::Legacy => PinState::High,
            ProbeLevels::AddressBits => PinState::from(bit_set),
        }
    }
}

/// Clocks `addr` onto the bus by hand and samples the acknowledge bit.
///
/// Returns `Ok` when a device pulled SDA low during the ninth clock,
/// [`Error::NoDevice`] otherwise.
pub fn probe_address<B, P, D, L>(
    lines: &mut B,
    platform: &mut P,
    delay: &mut D,
    mut logger: &mut L,
    addr: u16,
    mode: AddressingMode,
    levels: ProbeLevels,
) -> Result<(), Error>
where
    B: BusLines,
    P: ControllerPlatform,
    D: DelayNs,
    L: Logger,
{
    let mut session = BitBangSession::new(lines, platform);

    session.drive_sda(PinState::High)?;
    session.drive_scl(PinState::High)?;
    delay.delay_ms(PROBE_SETUP_MS);

    // START: SDA falls while SCL is high
    session.set_sda(PinState::Low)?;
    delay.delay_ms(EDGE_DELAY_MS);
    session.set_scl(PinState::Low)?;
    delay.delay_ms(EDGE_DELAY_MS);

    let nr_bits: u32 = match mode {
        AddressingMode::SevenBit => 7,
        AddressingMode::TenBit => 10,
    };
    i2c_log!(logger, debug, "i2c: sending {} bits using bit-bang", nr_bits);
    for bit in (0..nr_bits).rev() {
        session.set_sda(levels.level(addr & (1 << bit) != 0))?;
        delay.delay_ms(EDGE_DELAY_MS);
        session.set_scl(PinState::High)?;
        delay.delay_ms(EDGE_DELAY_MS);
        session.set_scl(PinState::Low)?;
        delay.delay_ms(EDGE_DELAY_MS);
    }

    session.release_sda()?;
    session.set_scl(PinState::High)?;
    delay.delay_ms(EDGE_DELAY_MS);
    let nack = session.sda_high()?;

    session.drive_sda(PinState::High)?;
    drop(session);

    if nack {
        Err(Error::NoDevice)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_log::RecordingLogger;
    use crate::common::NoOpLogger;
    use crate::i2c::sim::{LineOp, SimBus, SimDelay, SimLine, SimPlatform, SimRegs};
    use core::cell::Cell;

    fn delay() -> SimDelay<'static> {
        SimDelay::new(SimRegs::new())
    }

    #[test]
    fn reset_on_idle_bus() {
        let mut bus = SimBus::new();
        let mut platform = SimPlatform::default();
        let mut log = RecordingLogger::default();
        let mut delay = delay();

        let report = reset_bus(&mut bus, &mut platform, &mut delay, &mut log);

        assert!(report.initially_idle);
        assert!(report.idle_after);
        assert_eq!(report.effective_cycles, RESET_CLOCK_CYCLES);
        assert_eq!(report.sda_transitions, 0);
        assert!(log.contains("seems idle"));
        assert!(log.contains("reset successful"));

        let pulses = bus
            .scl_ops()
            .iter()
            .filter(|op| **op == LineOp::Output(PinState::Low))
            .count();
        assert_eq!(pulses, RESET_CLOCK_CYCLES as usize);
        // every edge settles for at least a millisecond
        assert!(delay.elapsed_us() >= 2_000 * u64::from(RESET_CLOCK_CYCLES) + 3_000);
    }

    #[test]
    fn reset_reports_stuck_sda_and_release() {
        let mut bus = SimBus::new();
        // low before the pulses and through the first two, released at the third
        bus.script_sda(&[false, false, false, true]);
        let mut platform = SimPlatform::default();
        let mut log = RecordingLogger::default();

        let report = reset_bus(&mut bus, &mut platform, &mut delay(), &mut log);

        assert!(report.sda_stuck_low);
        assert!(!report.initially_idle);
        assert_eq!(report.sda_transitions, 1);
        assert!(report.idle_after);
        assert!(log.contains("held low externally"));
        assert!(log.contains("SDA changed from 0 to 1 after 2 clock cycles"));
    }

    #[test]
    fn reset_counts_cycles_with_scl_held() {
        let mut bus = SimBus::new();
        bus.script_scl(&[true, false, false]);
        let mut platform = SimPlatform::default();
        let mut log = RecordingLogger::default();

        let report = reset_bus(&mut bus, &mut platform, &mut delay(), &mut log);

        assert_eq!(report.effective_cycles, RESET_CLOCK_CYCLES - 1);
        assert!(log.contains("SCL held low at start of clock cycle 0"));
        assert!(log.contains("SCL held low at end of clock cycle 0"));
    }

    #[test]
    fn session_restores_on_pin_error() {
        let mut bus = SimBus::new();
        bus.fail_after(3);
        let mut platform = SimPlatform::default();
        let mut log = RecordingLogger::default();

        let report = reset_bus(&mut bus, &mut platform, &mut delay(), &mut log);

        assert!(!report.idle_after);
        assert!(log.contains("bus reset aborted"));
        assert_eq!(bus.restores(), 1);
        assert_eq!(platform.irq_events(), ["disable", "enable"]);
    }

    #[test]
    fn probe_acknowledged_when_sda_low() {
        let mut bus = SimBus::new();
        bus.script_sda(&[false]);
        let mut platform = SimPlatform::default();

        let result = probe_address(
            &mut bus,
            &mut platform,
            &mut delay(),
            &mut NoOpLogger,
            0x50,
            AddressingMode::SevenBit,
            ProbeLevels::Legacy,
        );

        assert_eq!(result, Ok(()));
        assert_eq!(bus.restores(), 1);
        assert_eq!(platform.irq_events(), ["disable", "enable"]);
    }

    #[test]
    fn probe_without_ack_reports_no_device() {
        let mut bus = SimBus::new();
        let mut platform = SimPlatform::default();

        let result = probe_address(
            &mut bus,
            &mut platform,
            &mut delay(),
            &mut NoOpLogger,
            0x3a5,
            AddressingMode::TenBit,
            ProbeLevels::Legacy,
        );

        assert_eq!(result, Err(Error::NoDevice));
        let clocks = bus
            .scl_ops()
            .iter()
            .filter(|op| **op == LineOp::Set(PinState::High))
            .count();
        // ten address bits plus the acknowledge clock
        assert_eq!(clocks, 11);
        assert_eq!(bus.restores(), 1);
    }

    #[test]
    fn probe_bit_levels() {
        fn driven(levels: ProbeLevels) -> Vec<PinState> {
            let mut bus = SimBus::new();
            let _ = probe_address(
                &mut bus,
                &mut SimPlatform::default(),
                &mut delay(),
                &mut NoOpLogger,
                0x52,
                AddressingMode::SevenBit,
                levels,
            );
            bus.sda_ops()
                .iter()
                .filter_map(|op| match op {
                    LineOp::Set(level) => Some(*level),
                    _ => None,
                })
                .skip(1) // START
                .collect()
        }

        use PinState::{High, Low};
        assert_eq!(driven(ProbeLevels::Legacy), [High; 7]);
        assert_eq!(
            driven(ProbeLevels::AddressBits),
            [High, Low, High, Low, Low, High, Low]
        );
    }

    #[test]
    fn gpio_bus_restores_through_callback() {
        let restored = Cell::new(0);
        let mut bus = GpioBus::new(SimLine::default(), SimLine::default(), || {
            restored.set(restored.get() + 1);
        });
        let mut platform = SimPlatform::default();

        let report = reset_bus(&mut bus, &mut platform, &mut delay(), &mut NoOpLogger);
        assert!(report.idle_after);
        assert_eq!(restored.get(), 1);

        let (_scl, _sda, _restore) = bus.release();
    }
}
