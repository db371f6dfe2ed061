//! Two-byte `<channel, op>` serial protocol to a chamber controller.
//!
//! 19200 8N1, 5s read timeout. On open the link drains one line of
//! banner text and flushes input before it may be used; this mirrors
//! the handshake instrument-control links in this family commonly
//! perform before trusting the wire.

use std::io::{BufRead, BufReader, Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::SerialPort;

use crate::error::LinkError;

const BAUD_RATE: u32 = 19_200;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub const HOUSE_LIGHT_CHANNEL: u8 = 3;
pub const SOLENOID_CHANNEL: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Read = 0,
    WriteHigh = 1,
    WriteLow = 2,
    SetOutput = 3,
    SetInput = 4,
    Identify = 6,
}

/// One open serial connection to a chamber controller.
///
/// Exclusively owned by the [`crate::panel::Panel`] built on top of
/// it; concurrent use from two threads is a caller bug, not
/// something this type guards against.
pub struct HardwareLink {
    port: Box<dyn SerialPort>,
}

impl HardwareLink {
    pub fn open(device_path: &str) -> Result<Self, LinkError> {
        let mut port = serialport::new(device_path, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| LinkError::Io(e.into()))?;

        // Drain and discard the controller's banner line, then flush.
        let mut reader = BufReader::new(&mut *port);
        let mut banner = String::new();
        match reader.read_line(&mut banner) {
            Ok(_) => debug!("chamber link banner: {}", banner.trim_end()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                warn!("no banner received from {device_path} within timeout")
            }
            Err(e) => return Err(LinkError::Io(e)),
        }
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| LinkError::Io(e.into()))?;

        Ok(HardwareLink { port })
    }

    fn send(&mut self, channel: u8, op: Op) -> Result<(), LinkError> {
        self.port.write_all(&[channel, op as u8])?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, LinkError> {
        let mut buf = [0u8; 1];
        match self.port.read_exact(&mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(LinkError::Timeout),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    pub fn configure(&mut self, channel: u8, output: bool) -> Result<(), LinkError> {
        self.send(channel, if output { Op::SetOutput } else { Op::SetInput })
    }

    pub fn write(&mut self, channel: u8, level: bool) -> Result<(), LinkError> {
        self.send(channel, if level { Op::WriteHigh } else { Op::WriteLow })
    }

    pub fn read_level(&mut self, channel: u8) -> Result<bool, LinkError> {
        self.send(channel, Op::Read)?;
        Ok(self.read_byte()? != 0)
    }

    pub fn identify(&mut self) -> Result<Vec<u8>, LinkError> {
        self.send(0, Op::Identify)?;
        let mut reader = BufReader::new(&mut *self.port);
        let mut line = Vec::new();
        reader
            .read_until(b'\n', &mut line)
            .map_err(|e| LinkError::Io(e))?;
        Ok(line)
    }
}
