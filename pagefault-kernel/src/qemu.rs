use x86_64::instructions::port::Port;

/// `isa-debug-exit` I/O port, configured with `iobase=0xf4,iosize=0x04`.
const EXIT_PORT: u16 = 0xf4;

/// Values written to the exit port. QEMU exits with `(value << 1) | 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
    Broken = 0x12,
}

pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    unsafe {
        x86_64::instructions::interrupts::disable();
        let mut port: Port<u32> = Port::new(EXIT_PORT);
        port.write(exit_code as u32);
    }
    loop {
        x86_64::instructions::hlt();
    }
}
