//! # Pipeline Tests
//!
//! End-to-end tests of the job-to-bytes pipeline: a JSON job payload is
//! parsed, template-expanded, rendered to operations, and executed against
//! a byte-recording backend. The resulting ESC/POS stream is compared
//! byte-for-byte against sequences assembled from the protocol builders.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use recibo::document::{DocumentRenderer, Element, JobMessage};
use recibo::error::Result;
use recibo::printer::{DeviceBackend, JobOutcome, PrinterSession, PrinterStatus};
use recibo::protocol::{commands, qr as qr_cmd, text};
use recibo::template;

/// Backend that records every byte it would send to a device.
struct RecordingBackend {
    bytes: Arc<Mutex<Vec<u8>>>,
    closes: Arc<Mutex<u32>>,
}

impl RecordingBackend {
    fn new() -> (Self, Arc<Mutex<Vec<u8>>>, Arc<Mutex<u32>>) {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(Mutex::new(0));
        (
            Self {
                bytes: bytes.clone(),
                closes: closes.clone(),
            },
            bytes,
            closes,
        )
    }
}

impl DeviceBackend for RecordingBackend {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        *self.closes.lock().unwrap() += 1;
        Ok(())
    }

    fn probe(&mut self) -> PrinterStatus {
        PrinterStatus::Ready
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn parse_job(json: &str) -> JobMessage {
    let value: serde_json::Value = serde_json::from_str(json).unwrap();
    serde_json::from_value(template::expand_job(value)).unwrap()
}

fn print_job(json: &str) -> (JobOutcome, Vec<u8>, u32) {
    let job = parse_job(json);
    let ops = DocumentRenderer::new().render(&job.receipt_data);

    let (backend, bytes, closes) = RecordingBackend::new();
    let mut session = PrinterSession::with_backend(Box::new(backend));
    let outcome = session.print_document(&ops);

    let recorded = bytes.lock().unwrap().clone();
    let close_count = *closes.lock().unwrap();
    (outcome, recorded, close_count)
}

/// The bytes of one full formatting-state application.
fn format_bytes(align: text::Alignment, bold: bool, size: u8, underline: bool, italic: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(text::align(align));
    out.extend(text::bold(bold));
    out.extend(text::size(size));
    out.extend(text::underline(underline));
    out.extend(text::italic(italic));
    out
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

#[test]
fn formatted_text_job_produces_exact_byte_stream() {
    let (outcome, bytes, closes) = print_job(
        r#"{
            "order_id": "A1",
            "receipt_data": [{"f": {"a": "c", "b": true, "s": 2}}, "HELLO"]
        }"#,
    );
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(closes, 1);

    let mut expected = Vec::new();
    // Document start: defaults applied
    expected.extend(format_bytes(text::Alignment::Left, false, 1, false, false));
    // The format directive
    expected.extend(format_bytes(text::Alignment::Center, true, 2, false, false));
    // The text line
    expected.extend(b"HELLO\n");
    // Finalize: feed, cut
    expected.extend(commands::feed_lines(2));
    expected.extend(commands::cut_full());

    assert_eq!(bytes, expected);
}

#[test]
fn template_variables_expand_from_job_record() {
    let (_, bytes, _) = print_job(
        r#"{
            "order_id": "A42",
            "customer_name": "Ada",
            "receipt_data": ["Order {{order_id}} for {{customer_name}}"]
        }"#,
    );
    let text_bytes = b"Order A42 for Ada\n";
    assert_eq!(count_occurrences(&bytes, text_bytes), 1);
}

#[test]
fn unmatched_template_variable_left_in_place() {
    let (_, bytes, _) = print_job(
        r#"{"order_id": "A42", "receipt_data": ["Hi {{customer_name}}"]}"#,
    );
    assert_eq!(count_occurrences(&bytes, b"Hi {{customer_name}}\n"), 1);
}

#[test]
fn only_first_qr_is_printed() {
    let (_, bytes, _) = print_job(
        r#"{
            "order_id": "A1",
            "receipt_data": [
                {"qr_url": "https://a", "qr_size": 8},
                {"qr_url": "https://b", "qr_size": 8},
                {"qr": "https://c"}
            ]
        }"#,
    );
    // Exactly one native QR print command in the stream
    assert_eq!(count_occurrences(&bytes, &qr_cmd::print()), 1);
    // And it stores the first payload
    assert_eq!(count_occurrences(&bytes, b"https://a"), 1);
    assert_eq!(count_occurrences(&bytes, b"https://b"), 0);
}

#[test]
fn qr_prefixed_text_is_suppressed() {
    let (_, bytes, _) = print_job(
        r#"{"order_id": "A1", "receipt_data": ["QR: http://x", "kept"]}"#,
    );
    assert_eq!(count_occurrences(&bytes, b"http://x"), 0);
    assert_eq!(count_occurrences(&bytes, b"kept\n"), 1);
}

#[test]
fn line_directive_draws_centered_pattern() {
    let (_, bytes, _) = print_job(
        r#"{"order_id": "A1", "receipt_data": [{"line": {"type": "double", "width": 4}}]}"#,
    );
    let pattern = "════\n".as_bytes();
    assert_eq!(count_occurrences(&bytes, pattern), 1);

    // Centered before the pattern, restored to left after
    let center = text::align(text::Alignment::Center);
    let left = text::align(text::Alignment::Left);
    assert!(count_occurrences(&bytes, &center) >= 1);
    assert!(count_occurrences(&bytes, &left) >= 1);
}

#[test]
fn qr_bitmap_prints_through_raster_path() {
    // An 8x8 all-black bitmap: stride 1, 8 bytes of 0xFF.
    let (_, bytes, _) = print_job(
        r#"{
            "order_id": "A1",
            "receipt_data": [
                {"qr_bitmap": {"width": 8, "height": 8, "data": [255, 255, 255, 255, 255, 255, 255, 255]}}
            ]
        }"#,
    );
    // One full 8-row band: ESC * 0, 8 columns of 0xFF, LF
    let mut band = vec![0x1B, 0x2A, 0x00, 8, 0];
    band.extend([0xFF; 8]);
    band.push(0x0A);
    assert_eq!(count_occurrences(&bytes, &band), 1);
}

#[test]
fn malformed_payload_is_dropped_without_printing() {
    let raw = "{not json";
    let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str(raw);
    assert!(parsed.is_err());
    // The manager drops such payloads before rendering; nothing reaches
    // the printer and no job message exists to report on.
}

#[test]
fn empty_document_still_cuts_and_flushes() {
    let (outcome, bytes, closes) = print_job(r#"{"order_id": "A1", "receipt_data": []}"#);
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(closes, 1);
    assert!(bytes.ends_with(&[0x0A, 0x0A, 0x1D, 0x56, 0x00]));
}

#[test]
fn combined_receipt_renders_in_element_order() {
    let (outcome, bytes, _) = print_job(
        r#"{
            "order_id": "A9",
            "page": 1,
            "total_pages": 1,
            "receipt_data": [
                {"page": 1, "of": 1},
                {"m": {"order_id": "A9"}},
                {"f": {"a": "c", "b": true, "s": 2}},
                "RECEIPT",
                {"f": {"a": "l", "b": false, "s": 1}},
                "1x Coffee          3.50",
                {"line": "solid"},
                {"qr_url": "https://shop/order/{{order_id}}", "qr_size": 6},
                "Thank you!"
            ]
        }"#,
    );
    assert_eq!(outcome, JobOutcome::Completed);

    // Content appears in document order
    let header = find(&bytes, b"RECEIPT\n").unwrap();
    let item = find(&bytes, b"1x Coffee          3.50\n").unwrap();
    let footer = find(&bytes, b"Thank you!\n").unwrap();
    assert!(header < item && item < footer);

    // The QR payload was template-expanded
    assert_eq!(count_occurrences(&bytes, b"https://shop/order/A9"), 1);

    // Metadata elements printed nothing
    assert_eq!(count_occurrences(&bytes, b"A9\n"), 0);
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[test]
fn element_parse_tolerates_unknown_shapes() {
    let job = parse_job(r#"{"order_id": "A1", "receipt_data": ["ok", 42, [1], null]}"#);
    assert_eq!(job.receipt_data.len(), 4);
    assert!(matches!(&job.receipt_data[0], Element::Text(t) if t == "ok"));

    // Unknown shapes render to nothing but never abort the document
    let ops = DocumentRenderer::new().render(&job.receipt_data);
    assert_eq!(ops.len(), 3); // SetFormat + WriteText + Finalize
}
