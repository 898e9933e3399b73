//! # Device Backends
//!
//! Two interchangeable ways of reaching a thermal printer, behind one
//! explicit capability trait:
//!
//! - [`DirectDevice`]: an exclusive raw device handle (`/dev/usb/lp0`,
//!   `/dev/ttyUSB0`, ...). Every operation is written immediately.
//! - [`BufferedQueue`]: a named system print queue (CUPS). Operations
//!   accumulate in memory and the whole document is handed to `lp` as one
//!   unit on `close()` — a document either fully buffers and sends, or
//!   nothing is sent.
//!
//! ## TTY Configuration
//!
//! Serial-style devices must be in raw mode so binary data passes through
//! unmodified — in particular XON/XOFF flow control has to be off because
//! 0x11 and 0x13 can appear in raster data. Non-TTY device nodes (USB
//! line printers) reject termios calls; that is fine and the configuration
//! step is skipped.
//!
//! ## Chunked Writes
//!
//! Large blocks (QR rasters) are written in 4096-byte chunks with a small
//! delay so slow device buffers are not overrun.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ReciboError, Result};
use crate::printer::PrinterStatus;
use crate::protocol::{commands, text};

/// Default chunk size for direct device writes (bytes)
const CHUNK_SIZE: usize = 4096;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 2;

/// # Printer Capability Set
///
/// The operations a printer session may invoke, implemented by both
/// backends. Style setters have default implementations in terms of
/// [`write_raw`](DeviceBackend::write_raw) since they only differ in where
/// the bytes go.
pub trait DeviceBackend: Send {
    /// Append raw protocol bytes to the device or buffer.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush the current document. For a buffered queue this submits the
    /// whole buffer as one print job; for a direct device it drains the
    /// handle. The backend stays usable for the next document.
    fn close(&mut self) -> Result<()>;

    /// Cheap liveness check, called at most every status interval.
    fn probe(&mut self) -> PrinterStatus;

    /// Human-readable backend identity for logs.
    fn name(&self) -> &str;

    /// Reset the printer to power-on defaults.
    fn init(&mut self) -> Result<()> {
        self.write_raw(&commands::init())
    }

    fn set_align(&mut self, alignment: text::Alignment) -> Result<()> {
        self.write_raw(&text::align(alignment))
    }

    fn set_bold(&mut self, enabled: bool) -> Result<()> {
        self.write_raw(&text::bold(enabled))
    }

    fn set_size(&mut self, size: u8) -> Result<()> {
        self.write_raw(&text::size(size))
    }

    fn write_text(&mut self, content: &str) -> Result<()> {
        self.write_raw(content.as_bytes())
    }

    /// Feed and cut. When the cutter write fails the backend falls back to
    /// extra blank lines so the receipt can still be torn off.
    fn cut(&mut self) -> Result<()> {
        self.write_raw(&commands::feed_lines(2))?;
        if self.write_raw(&commands::cut_full()).is_err() {
            self.write_raw(&commands::feed_lines(3))?;
        }
        Ok(())
    }
}

// ============================================================================
// DIRECT DEVICE
// ============================================================================

/// A printer reached through an exclusive raw device handle.
pub struct DirectDevice {
    file: File,
    path: String,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl DirectDevice {
    /// Open the device node for exclusive writing and put it in raw mode
    /// when it is a TTY.
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| ReciboError::Device(format!("failed to open {}: {}", path, e)))?;

        configure_tty_raw(&file);

        info!(path, "opened direct printer device");
        Ok(Self {
            file,
            path: path.to_string(),
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        })
    }
}

impl DeviceBackend for DirectDevice {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        for chunk in bytes.chunks(self.chunk_size) {
            self.file
                .write_all(chunk)
                .map_err(|e| ReciboError::Device(format!("write to {} failed: {}", self.path, e)))?;

            if bytes.len() > self.chunk_size && !self.chunk_delay.is_zero() {
                thread::sleep(self.chunk_delay);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| ReciboError::Device(format!("flush of {} failed: {}", self.path, e)))
    }

    fn probe(&mut self) -> PrinterStatus {
        // A zero-length write exercises the file descriptor without
        // feeding paper; a dead handle (unplugged USB) errors here.
        match self.file.write(&[]).and_then(|_| self.file.flush()) {
            Ok(_) => PrinterStatus::Ready,
            Err(e) => {
                debug!(path = %self.path, error = %e, "device probe failed");
                PrinterStatus::Offline
            }
        }
    }

    fn name(&self) -> &str {
        &self.path
    }
}

/// Configure a device handle for raw binary output when it is a TTY.
///
/// Disables input/output processing, echo, canonical mode, and XON/XOFF
/// flow control, and selects 8-bit characters. Silently skipped for
/// non-TTY nodes.
#[cfg(unix)]
fn configure_tty_raw(file: &File) {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();

    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        debug!("device is not a TTY, skipping raw mode setup");
        return;
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        debug!(
            error = %io::Error::last_os_error(),
            "tcsetattr failed, continuing with device defaults"
        );
    }
}

#[cfg(not(unix))]
fn configure_tty_raw(_file: &File) {}

// ============================================================================
// BUFFERED QUEUE
// ============================================================================

/// A printer reached through a named system print queue.
///
/// Nothing is transmitted until [`close`](DeviceBackend::close); the entire
/// document is then piped to `lp -d <queue>` as one raw job.
pub struct BufferedQueue {
    queue: String,
    buffer: Vec<u8>,
}

impl BufferedQueue {
    /// Bind to a named queue, verifying it exists via `lpstat`.
    pub fn open(queue: &str) -> Result<Self> {
        if !queue_exists(queue) {
            return Err(ReciboError::Device(format!(
                "print queue '{}' not found",
                queue
            )));
        }
        info!(queue, "bound to system print queue");
        Ok(Self {
            queue: queue.to_string(),
            buffer: Vec::new(),
        })
    }

    /// Bytes buffered for the current document.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

impl DeviceBackend for BufferedQueue {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut child = Command::new("lp")
            .arg("-d")
            .arg(&self.queue)
            .arg("-o")
            .arg("raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ReciboError::Device(format!("failed to run lp: {}", e)))?;

        child
            .stdin
            .take()
            .ok_or_else(|| ReciboError::Device("lp stdin unavailable".to_string()))?
            .write_all(&self.buffer)
            .map_err(|e| ReciboError::Device(format!("failed to pipe job to lp: {}", e)))?;

        let status = child
            .wait()
            .map_err(|e| ReciboError::Device(format!("lp did not exit: {}", e)))?;
        if !status.success() {
            return Err(ReciboError::Device(format!(
                "lp exited with {} for queue '{}'",
                status, self.queue
            )));
        }

        info!(queue = %self.queue, bytes = self.buffer.len(), "print job submitted");
        self.buffer.clear();
        Ok(())
    }

    fn probe(&mut self) -> PrinterStatus {
        if queue_enabled(&self.queue) {
            PrinterStatus::Ready
        } else {
            PrinterStatus::Offline
        }
    }

    fn name(&self) -> &str {
        &self.queue
    }
}

// ============================================================================
// QUEUE DISCOVERY
// ============================================================================

fn queue_exists(queue: &str) -> bool {
    Command::new("lpstat")
        .arg("-p")
        .arg(queue)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn queue_enabled(queue: &str) -> bool {
    Command::new("lpstat")
        .arg("-p")
        .arg(queue)
        .output()
        .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).contains("enabled"))
        .unwrap_or(false)
}

/// Scan the system's print queues for something that looks like a thermal
/// receipt printer. Used as the last-resort connection strategy.
pub fn find_thermal_queue() -> Option<String> {
    let output = Command::new("lpstat").arg("-p").output().ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if !(line.starts_with("printer") && line.contains("enabled")) {
            continue;
        }
        let Some(name) = line.split_whitespace().nth(1) else {
            continue;
        };
        let lower = name.to_lowercase();
        if ["thermal", "receipt", "pos", "80mm"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            return Some(name.to_string());
        }
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::text::Alignment;

    fn queue_for_test() -> BufferedQueue {
        BufferedQueue {
            queue: "test_queue".to_string(),
            buffer: Vec::new(),
        }
    }

    #[test]
    fn test_buffered_queue_accumulates() {
        let mut queue = queue_for_test();
        queue.init().unwrap();
        queue.write_text("hi\n").unwrap();

        let mut expected = vec![0x1B, 0x40];
        expected.extend(b"hi\n");
        assert_eq!(queue.pending(), &expected[..]);
    }

    #[test]
    fn test_default_style_setters_emit_protocol_bytes() {
        let mut queue = queue_for_test();
        queue.set_align(Alignment::Center).unwrap();
        queue.set_bold(true).unwrap();
        queue.set_size(2).unwrap();

        assert_eq!(
            queue.pending(),
            &[0x1B, 0x61, 0x01, 0x1B, 0x45, 0x01, 0x1D, 0x21, 0x11][..]
        );
    }

    #[test]
    fn test_cut_feeds_then_cuts() {
        let mut queue = queue_for_test();
        queue.cut().unwrap();
        assert_eq!(queue.pending(), &[0x0A, 0x0A, 0x1D, 0x56, 0x00][..]);
    }

    #[test]
    fn test_close_with_empty_buffer_is_noop() {
        // No lp invocation should happen for an empty buffer; this must
        // succeed even on systems without CUPS.
        let mut queue = queue_for_test();
        assert!(queue.close().is_ok());
    }
}
