use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Abstraction over the byte stream carrying the AT dialog.
///
/// The driver only ever needs to push bytes out, poll how many are waiting,
/// and drain stale buffers around session boundaries. Anything that can do
/// that (a serial port, a ser2net bridge, a scripted mock in tests) can back
/// the driver.
pub trait ModemChannel: Read + Write + Send {
    /// Get number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Discard anything sitting in the inbound buffer
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Discard anything not yet transmitted
    fn clear_output_buffer(&mut self) -> io::Result<()>;
}

/// Serial port wrapper implementing ModemChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Set the blocking-read window used while pumping the line
    pub fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl ModemChannel for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Output)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
