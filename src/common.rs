// Licensed under the Apache-2.0 license

//! Crate-wide support types shared by the driver modules.

/// Sink for driver diagnostics.
///
/// Drivers hold a logger by value and report conditions through it. The
/// default methods for `info` and `warn` forward to `debug` and `error` so a
/// minimal implementation only has to provide two methods.
pub trait Logger {
    fn debug(&mut self, msg: &str);
    fn error(&mut self, msg: &str);

    fn info(&mut self, msg: &str) {
        self.debug(msg);
    }

    fn warn(&mut self, msg: &str) {
        self.error(msg);
    }
}

impl<L: Logger + ?Sized> Logger for &mut L {
    fn debug(&mut self, msg: &str) {
        (**self).debug(msg);
    }
    fn error(&mut self, msg: &str) {
        (**self).error(msg);
    }
    fn info(&mut self, msg: &str) {
        (**self).info(msg);
    }
    fn warn(&mut self, msg: &str) {
        (**self).warn(msg);
    }
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&mut self, _msg: &str) {}
    fn error(&mut self, _msg: &str) {}
}

/// Capacity of the stack buffer used to format one log line.
pub const LOG_LINE_CAPACITY: usize = 128;

/// Formats a message into a `heapless::String` and hands it to a [`Logger`].
///
/// Lines longer than [`LOG_LINE_CAPACITY`] are truncated.
///
/// ```rust,ignore
/// i2c_log!(self.logger, warn, "timeout waiting for interrupt (cmd = {:#x})", cmd);
/// ```
#[macro_export]
macro_rules! i2c_log {
    ($logger:expr, $level:ident, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let mut line: $crate::__heapless::String<{ $crate::common::LOG_LINE_CAPACITY }> =
            $crate::__heapless::String::new();
        let _ = write!(line, $($arg)*);
        $crate::common::Logger::$level(&mut $logger, line.as_str());
    }};
}
