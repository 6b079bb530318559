use core::fmt::{Result, Write};

use x86_64::instructions::port::Port;

/// COM1.
const SERIAL_PORT: u16 = 0x3f8;

struct SerialPortWriter(u16);

impl Write for SerialPortWriter {
    fn write_str(&mut self, s: &str) -> Result {
        let mut port = Port::new(self.0);

        for byte in s.bytes() {
            unsafe {
                port.write(byte);
            }
        }

        Ok(())
    }
}

pub fn _print(args: ::core::fmt::Arguments) {
    SerialPortWriter(SERIAL_PORT).write_fmt(args).unwrap();
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::logging::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => { $crate::print!("\n") };
    ($($arg:tt)*) => {
        {
            $crate::print!($($arg)*);
            $crate::print!("\n");
        }
    };
}

/// `log` backend writing `[file:line] LEVEL: message` lines to the serial console.
pub struct Logger;

impl Logger {
    pub fn init(&self) {
        // Reset whatever colour the firmware left behind.
        _print(format_args!("\x1b[0m"));
    }
}

impl log::Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            println!(
                "[{}:{}] {}: {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
