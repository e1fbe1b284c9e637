use std::io::Write;
use std::path::{Path, PathBuf};

use serial2::SerialPort;

use crate::error::SerialError;
use crate::wire::Command;

pub fn list_devices() -> std::io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

/// Anything that can carry commands to the microcontroller. The control loop
/// only talks to this seam, so tests can swap in a recording sink.
pub trait Dispatch {
    fn send(&mut self, command: &Command) -> Result<(), SerialError>;
}

/// The single process-owned serial handle. Opened on an explicit Connect,
/// released when dropped or on Disconnect. Writes go out one command at a
/// time, flushed immediately.
#[derive(Default)]
pub struct SprayerLink {
    port: Option<SerialPort>,
}

impl SprayerLink {
    pub fn open(&mut self, path: &Path, baud: u32) -> Result<(), SerialError> {
        let port = SerialPort::open(path, baud).map_err(|source| SerialError::Open {
            port: path.display().to_string(),
            source,
        })?;
        tracing::info!(port = %path.display(), baud, "serial link open");
        self.port = Some(port);
        Ok(())
    }

    pub fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("serial link closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Dispatch for SprayerLink {
    fn send(&mut self, command: &Command) -> Result<(), SerialError> {
        let port = self.port.as_ref().ok_or(SerialError::NotConnected)?;
        let message = command.encode();

        let mut writer: &SerialPort = port;
        writer
            .write_all(message.as_bytes())
            .map_err(SerialError::Write)?;
        writer.flush().map_err(SerialError::Write)?;

        tracing::debug!(message = message.trim_end(), "sent");
        Ok(())
    }
}
