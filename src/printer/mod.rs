//! # Printer Session
//!
//! A [`PrinterSession`] owns one device backend and executes rendered
//! operation lists against it. The session is the failure boundary for
//! printing: a device error aborts the current document only, the session
//! stays open for the next job, and nothing propagates past
//! [`PrinterSession::print_document`].
//!
//! ## Modules
//!
//! - [`backend`]: the capability trait and its two implementations

pub mod backend;

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::document::ops::{Op, QrPayload, QrSpec};
use crate::document::renderer::DocumentRenderer;
use crate::document::schema::{Directive, Element, Flag, FormatDirective, LineSpec};
use crate::document::FormatState;
use crate::error::{ReciboError, Result};
use crate::protocol::text::{self, Alignment};
use crate::qr;

pub use backend::{BufferedQueue, DeviceBackend, DirectDevice};

/// Minimum interval between device liveness probes.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Delay between disconnect and reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// STATUS & STATS
// ============================================================================

/// Printer status values, matching the wire strings reported upstream.
///
/// `Offline` is both the initial state (before connect) and the terminal
/// state (after disconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrinterStatus {
    Ready,
    PaperOut,
    PaperLow,
    CoverOpen,
    CutterError,
    Overheat,
    MechanicalError,
    #[default]
    Offline,
}

impl PrinterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterStatus::Ready => "ready",
            PrinterStatus::PaperOut => "paper_out",
            PrinterStatus::PaperLow => "paper_low",
            PrinterStatus::CoverOpen => "cover_open",
            PrinterStatus::CutterError => "cutter_error",
            PrinterStatus::Overheat => "overheat",
            PrinterStatus::MechanicalError => "mechanical_error",
            PrinterStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic job counters. Mutated only once a document's terminal outcome
/// is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintStats {
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub failed_jobs: u64,
}

/// Terminal outcome of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

impl JobOutcome {
    /// The wire string published in status records.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
        }
    }
}

/// A point-in-time view of the printer, taken for heartbeat and status
/// records.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub online: bool,
    pub status: PrinterStatus,
    pub paper_present: bool,
    pub cover_closed: bool,
    pub cutter_ok: bool,
    pub stats: PrintStats,
}

/// Where to find the printer.
#[derive(Debug, Clone)]
pub struct PrinterOptions {
    /// Named system print queue, tried first.
    pub queue_name: String,
    /// Raw device node, tried second.
    pub device_path: Option<String>,
}

// ============================================================================
// SESSION
// ============================================================================

/// Owns a device backend and executes documents against it.
///
/// Device access is exclusive: no two sessions may hold the same device
/// handle.
pub struct PrinterSession {
    options: PrinterOptions,
    backend: Option<Box<dyn DeviceBackend>>,
    stats: PrintStats,
    status: PrinterStatus,
    last_probe: Option<Instant>,
}

impl PrinterSession {
    pub fn new(options: PrinterOptions) -> Self {
        Self {
            options,
            backend: None,
            stats: PrintStats::default(),
            status: PrinterStatus::Offline,
            last_probe: None,
        }
    }

    /// Build a session around an already-open backend. Used by tests and
    /// one-shot tools that bypass connection strategy.
    pub fn with_backend(backend: Box<dyn DeviceBackend>) -> Self {
        Self {
            options: PrinterOptions {
                queue_name: backend.name().to_string(),
                device_path: None,
            },
            backend: Some(backend),
            stats: PrintStats::default(),
            status: PrinterStatus::Ready,
            last_probe: Some(Instant::now()),
        }
    }

    /// Connect to the printer, trying the named queue, then the raw device
    /// node, then auto-detection of a thermal-looking queue.
    pub fn connect(&mut self) -> Result<()> {
        info!(queue = %self.options.queue_name, "connecting to printer");

        let backend: Box<dyn DeviceBackend> =
            match BufferedQueue::open(&self.options.queue_name) {
                Ok(queue) => Box::new(queue),
                Err(queue_err) => {
                    debug!(error = %queue_err, "named queue unavailable");
                    if let Some(path) = self.options.device_path.clone() {
                        match DirectDevice::open(&path) {
                            Ok(device) => Box::new(device),
                            Err(device_err) => {
                                debug!(error = %device_err, "direct device unavailable");
                                self.auto_detect()?
                            }
                        }
                    } else {
                        self.auto_detect()?
                    }
                }
            };

        let mut backend = backend;
        backend.init()?;
        info!(backend = backend.name(), "printer connected");

        self.backend = Some(backend);
        self.status = PrinterStatus::Ready;
        self.last_probe = Some(Instant::now());
        Ok(())
    }

    fn auto_detect(&self) -> Result<Box<dyn DeviceBackend>> {
        match backend::find_thermal_queue() {
            Some(name) => {
                info!(queue = %name, "auto-detected thermal print queue");
                Ok(Box::new(BufferedQueue::open(&name)?))
            }
            None => Err(ReciboError::Device(
                "no printer found: queue missing, no device path, auto-detect empty".to_string(),
            )),
        }
    }

    /// Close the backend and mark the printer offline.
    pub fn disconnect(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.close() {
                debug!(error = %e, "error while closing printer");
            }
            info!("printer disconnected");
        }
        self.status = PrinterStatus::Offline;
        self.last_probe = None;
    }

    /// Disconnect, wait briefly, and connect again.
    pub fn reconnect(&mut self) -> Result<()> {
        info!("attempting printer reconnection");
        self.disconnect();
        std::thread::sleep(RECONNECT_DELAY);
        self.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    pub fn stats(&self) -> PrintStats {
        self.stats
    }

    /// Current printer status, re-probed at most every 30 seconds.
    pub fn status(&mut self) -> PrinterStatus {
        let Some(backend) = self.backend.as_mut() else {
            return PrinterStatus::Offline;
        };

        let due = self
            .last_probe
            .is_none_or(|at| at.elapsed() >= PROBE_INTERVAL);
        if due {
            self.status = backend.probe();
            self.last_probe = Some(Instant::now());
            debug!(status = %self.status, "printer status probed");
        }
        self.status
    }

    /// Snapshot for outbound records.
    pub fn snapshot(&mut self) -> StatusSnapshot {
        let status = self.status();
        StatusSnapshot {
            online: self.is_connected() && status != PrinterStatus::Offline,
            status,
            paper_present: status != PrinterStatus::PaperOut,
            cover_closed: status != PrinterStatus::CoverOpen,
            cutter_ok: status != PrinterStatus::CutterError,
            stats: self.stats,
        }
    }

    /// Execute a rendered document.
    ///
    /// Never returns an error: the outcome is counted and reported, the
    /// session stays open for the next job.
    pub fn print_document(&mut self, ops: &[Op]) -> JobOutcome {
        self.stats.total_jobs += 1;

        match self.execute(ops) {
            Ok(()) => {
                debug!("document printed");
                self.stats.successful_jobs += 1;
                JobOutcome::Completed
            }
            Err(e) => {
                error!(error = %e, "document aborted");
                self.stats.failed_jobs += 1;
                JobOutcome::Failed
            }
        }
    }

    fn execute(&mut self, ops: &[Op]) -> Result<()> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| ReciboError::Device("printer not connected".to_string()))?;

        // Every document starts from the default formatting state.
        let mut current = FormatState::default();
        apply_format(backend.as_mut(), &current)?;

        for op in ops {
            match op {
                Op::SetFormat(state) => {
                    apply_format(backend.as_mut(), state)?;
                    current = *state;
                }
                Op::WriteText(content) => backend.write_text(content)?,
                Op::DrawLine { kind, width, .. } => {
                    backend.set_align(Alignment::Center)?;
                    backend.write_text(&format!("{}\n", kind.pattern(*width)))?;
                    backend.set_align(current.align)?;
                }
                Op::Qr(spec) => {
                    execute_qr(backend.as_mut(), spec)?;
                    // The QR sequence set its own alignment; restore the
                    // document's.
                    backend.set_align(current.align)?;
                }
                Op::Finalize => {
                    backend.cut()?;
                    backend.close()?;
                }
            }
        }

        Ok(())
    }

    /// Print the built-in test receipt.
    pub fn test_print(&mut self) -> JobOutcome {
        let document = test_document(&self.options.queue_name);
        let ops = DocumentRenderer::new().render(&document);
        self.print_document(&ops)
    }
}

/// Apply the full persistent formatting state to the device.
///
/// Alignment, bold, and size go through the backend capability set;
/// underline and italic ride on `write_raw` since not every clone supports
/// them and the sequences are ignored where unsupported.
fn apply_format(backend: &mut dyn DeviceBackend, state: &FormatState) -> Result<()> {
    backend.set_align(state.align)?;
    backend.set_bold(state.bold)?;
    backend.set_size(state.size)?;
    backend.write_raw(&text::underline(state.underline))?;
    backend.write_raw(&text::italic(state.italic))?;
    Ok(())
}

/// Print a QR operation with the explicit fallback chain:
/// native command → locally rendered bitmap → payload as text.
fn execute_qr(backend: &mut dyn DeviceBackend, spec: &QrSpec) -> Result<()> {
    match &spec.payload {
        QrPayload::Text(payload) => {
            let device_size = qr::size_class_to_device_size(spec.size_class);
            let native = qr::build_native_command(payload, device_size, spec.alignment);
            if backend.write_raw(&native).is_ok() {
                return Ok(());
            }
            warn!("native QR print failed, falling back to bitmap");

            match qr::build_bitmap(payload, spec.size_class) {
                Ok(image) => {
                    if write_bitmap(backend, &image, spec.alignment).is_ok() {
                        return Ok(());
                    }
                    warn!("bitmap QR print failed, falling back to text");
                }
                Err(e) => warn!(error = %e, "QR bitmap generation failed, falling back to text"),
            }

            backend.write_text(&format!("QR Code: {}\n", payload))
        }
        QrPayload::Bitmap(image) => write_bitmap(backend, image, spec.alignment),
    }
}

fn write_bitmap(
    backend: &mut dyn DeviceBackend,
    image: &crate::bitmap::BitmapImage,
    alignment: Alignment,
) -> Result<()> {
    backend.set_align(alignment)?;
    backend.write_raw(&image.to_raster_commands())
}

/// The built-in test receipt, printable with `recibo test-print`.
pub fn test_document(printer_name: &str) -> Vec<Element> {
    let header_format = Directive {
        f: Some(FormatDirective {
            a: Some("c".to_string()),
            b: Some(Flag::Bool(true)),
            s: Some(2),
            ..Default::default()
        }),
        ..Default::default()
    };
    let body_format = Directive {
        f: Some(FormatDirective {
            a: Some("l".to_string()),
            b: Some(Flag::Bool(false)),
            s: Some(1),
            ..Default::default()
        }),
        ..Default::default()
    };
    let footer_format = Directive {
        f: Some(FormatDirective {
            a: Some("c".to_string()),
            b: Some(Flag::Bool(true)),
            ..Default::default()
        }),
        ..Default::default()
    };

    vec![
        Element::Directive(header_format),
        Element::Text("Recibo Printer Test".to_string()),
        Element::Directive(body_format),
        Element::Text(String::new()),
        Element::Text(format!(
            "Date: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )),
        Element::Text(format!("Printer: {}", printer_name)),
        Element::Text("Status: connected".to_string()),
        Element::Text(String::new()),
        Element::Directive(Directive {
            line: Some(LineSpec::Kind("solid".to_string())),
            ..Default::default()
        }),
        Element::Text(String::new()),
        Element::Directive(Directive {
            qr_url: Some("https://example.com/test".to_string()),
            qr_size: Some(8),
            ..Default::default()
        }),
        Element::Text(String::new()),
        Element::Directive(footer_format),
        Element::Text("Test completed".to_string()),
    ]
}

// ============================================================================
// TESTS
// ============================================================================
