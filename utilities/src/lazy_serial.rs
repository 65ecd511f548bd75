use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serial2::SerialPort;
use tracing::{debug, info, warn};

/// Serial port that is opened on first use and dropped on a broken link, so
/// the next read or write opens it again.
pub struct LazySerialPort {
    path: PathBuf,
    baud_rate: u32,
    port: Option<SerialPort>,
    read_timeout: Duration,
    write_timeout: Duration,
}

fn is_link_lost(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

impl LazySerialPort {
    pub fn new<P: AsRef<Path>>(
        path: P,
        baud_rate: u32,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        LazySerialPort {
            path: path.as_ref().to_path_buf(),
            baud_rate,
            port: None,
            read_timeout,
            write_timeout,
        }
    }

    fn connect(&mut self) -> io::Result<()> {
        debug!("Opening serial port {}", self.path.display());

        // Open failures are reported as NotConnected so callers can tell them
        // apart from a port that stopped answering.
        let mut port = SerialPort::open(&self.path, self.baud_rate).map_err(|e| {
            io::Error::new(
                ErrorKind::NotConnected,
                format!("Failed to open {}: {}", self.path.display(), e),
            )
        })?;
        port.set_read_timeout(self.read_timeout)?;
        port.set_write_timeout(self.write_timeout)?;
        port.discard_buffers()?;

        info!(
            "Serial port {} opened at {} baud",
            self.path.display(),
            self.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }

    fn ensure_connected(&mut self) -> io::Result<&mut SerialPort> {
        if self.port.is_none() {
            self.connect()?;
        }
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "Serial port is not open"))
    }

    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            warn!("Serial port {} closed", self.path.display());
        }
    }

    fn check<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if is_link_lost(e.kind()) {
                self.disconnect();
            }
        }
        result
    }
}

impl Read for LazySerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = match self.ensure_connected() {
            Ok(port) => match port.read(buf) {
                // A serial read only returns zero bytes when the device node
                // went away.
                Ok(0) => Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "Serial port returned end of file",
                )),
                other => other,
            },
            Err(e) => Err(e),
        };
        self.check(result)
    }
}

impl Write for LazySerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.ensure_connected().and_then(|port| port.write(buf));
        self.check(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.ensure_connected().and_then(|port| port.flush());
        self.check(result)
    }
}
