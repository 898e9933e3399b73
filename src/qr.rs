//! # QR Code Generation
//!
//! This module maps the logical QR size classes carried by job messages
//! onto pixel dimensions and device module sizes, and builds the two
//! representations a QR directive can take on the wire to the printer:
//!
//! - A **native command sequence** (`GS ( k`), letting the printer firmware
//!   rasterize the symbol. Preferred: crisp output, tiny payload.
//! - A **packed bitmap**, generated locally with the `qrcode` crate and
//!   printed through the raster path. Fallback for printers whose clone
//!   firmware mishandles `GS ( k`.
//!
//! ## Size Classes
//!
//! Job messages carry an integer size class 1-16. It maps to fixed pixel
//! squares for bitmap rendering and to fixed module sizes for native
//! rendering; both tables are monotonic non-decreasing.

use qrcode::{Color, EcLevel, QrCode};
use tracing::warn;

use crate::bitmap::BitmapImage;
use crate::error::{ReciboError, Result};
use crate::protocol::qr as qr_cmd;
use crate::protocol::text::{self, Alignment};

/// Maximum payload stored in the printer's QR symbol buffer, in bytes.
/// Longer payloads are truncated with a warning; small receipt printers
/// reject (or worse, garble) larger symbol buffers.
pub const MAX_NATIVE_PAYLOAD: usize = 200;

/// Quiet zone around locally rendered QR symbols, in modules.
const QUIET_ZONE_MODULES: usize = 4;

/// Map a size class (1-16) to the pixel edge length of a rendered bitmap.
///
/// | Class | Pixels |
/// |-------|--------|
/// | 1-3   | 64     |
/// | 4-6   | 96     |
/// | 7-10  | 128    |
/// | 11-12 | 160    |
/// | 13-16 | 192    |
pub fn size_class_to_pixels(class: u8) -> u16 {
    match class {
        0..=3 => 64,
        4..=6 => 96,
        7..=10 => 128,
        11..=12 => 160,
        _ => 192,
    }
}

/// Map a size class (1-16) to the native module size in dots, clamped to
/// the printer's 1-16 range.
///
/// | Class | Module size |
/// |-------|-------------|
/// | 1-4   | 3           |
/// | 5-8   | 6           |
/// | 9-12  | 10          |
/// | 13-16 | 12          |
pub fn size_class_to_device_size(class: u8) -> u8 {
    let size = match class {
        0..=4 => 3,
        5..=8 => 6,
        9..=12 => 10,
        _ => 12,
    };
    size.clamp(1, 16)
}

/// Render `text` into a packed 1-bit bitmap at the size class's pixel
/// dimensions.
///
/// The QR matrix is generated at error correction level M (the generator
/// default), framed with a 4-module quiet zone, and scaled to the target
/// square with nearest-neighbor sampling so modules stay sharp.
pub fn build_bitmap(text: &str, size_class: u8) -> Result<BitmapImage> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
        .map_err(|e| ReciboError::Protocol(format!("QR encoding failed: {}", e)))?;

    let modules = code.width();
    let colors = code.to_colors();
    let total = modules + 2 * QUIET_ZONE_MODULES;
    let target = size_class_to_pixels(size_class) as usize;

    let mut pixels = Vec::with_capacity(target * target);
    for y in 0..target {
        let src_y = y * total / target;
        for x in 0..target {
            let src_x = x * total / target;
            let black = src_x >= QUIET_ZONE_MODULES
                && src_y >= QUIET_ZONE_MODULES
                && src_x < QUIET_ZONE_MODULES + modules
                && src_y < QUIET_ZONE_MODULES + modules
                && colors[(src_y - QUIET_ZONE_MODULES) * modules + (src_x - QUIET_ZONE_MODULES)]
                    == Color::Dark;
            pixels.push(if black { 0 } else { 255 });
        }
    }

    BitmapImage::encode(&pixels, target as u16, target as u16)
}

/// Build the native QR command sequence for `text`.
///
/// The sequence is prefixed with a `SetAlign` so the symbol lands where the
/// directive asked; restoring the document's own alignment afterwards is
/// the caller's job (it knows the persistent format state).
///
/// Payloads over [`MAX_NATIVE_PAYLOAD`] bytes are truncated with a warning.
pub fn build_native_command(text: &str, device_size: u8, alignment: Alignment) -> Vec<u8> {
    let mut payload = text.as_bytes();
    if payload.len() > MAX_NATIVE_PAYLOAD {
        warn!(
            len = payload.len(),
            max = MAX_NATIVE_PAYLOAD,
            "QR payload truncated for native print"
        );
        payload = &payload[..MAX_NATIVE_PAYLOAD];
    }

    let mut cmd = Vec::new();
    cmd.extend(text::align(alignment));
    cmd.extend(qr_cmd::set_model());
    cmd.extend(qr_cmd::set_module_size(device_size));
    cmd.extend(qr_cmd::set_error_correction(qr_cmd::QrEcLevel::High));
    cmd.extend(qr_cmd::store_data(payload));
    cmd.extend(qr_cmd::print());
    cmd.extend(crate::protocol::commands::feed_lines(2));
    cmd
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_class_to_pixels_table() {
        assert_eq!(size_class_to_pixels(1), 64);
        assert_eq!(size_class_to_pixels(3), 64);
        assert_eq!(size_class_to_pixels(4), 96);
        assert_eq!(size_class_to_pixels(6), 96);
        assert_eq!(size_class_to_pixels(7), 128);
        assert_eq!(size_class_to_pixels(10), 128);
        assert_eq!(size_class_to_pixels(11), 160);
        assert_eq!(size_class_to_pixels(12), 160);
        assert_eq!(size_class_to_pixels(13), 192);
        assert_eq!(size_class_to_pixels(16), 192);
    }

    #[test]
    fn test_size_class_to_device_size_table() {
        assert_eq!(size_class_to_device_size(1), 3);
        assert_eq!(size_class_to_device_size(4), 3);
        assert_eq!(size_class_to_device_size(5), 6);
        assert_eq!(size_class_to_device_size(8), 6);
        assert_eq!(size_class_to_device_size(9), 10);
        assert_eq!(size_class_to_device_size(12), 10);
        assert_eq!(size_class_to_device_size(13), 12);
        assert_eq!(size_class_to_device_size(16), 12);
    }

    #[test]
    fn test_size_tables_monotonic() {
        for n in 1..16u8 {
            assert!(size_class_to_pixels(n) <= size_class_to_pixels(n + 1));
            assert!(size_class_to_device_size(n) <= size_class_to_device_size(n + 1));
        }
    }

    #[test]
    fn test_build_bitmap_dimensions() {
        let image = build_bitmap("https://example.com/order/123", 10).unwrap();
        assert_eq!(image.width, 128);
        assert_eq!(image.height, 128);
        assert!(image.validate().is_ok());
    }

    #[test]
    fn test_build_bitmap_has_quiet_zone() {
        let image = build_bitmap("test", 4).unwrap();
        // The outermost pixels belong to the quiet zone and must be white.
        for x in 0..image.width {
            assert!(!image.is_black(x, 0));
            assert!(!image.is_black(x, image.height - 1));
        }
        for y in 0..image.height {
            assert!(!image.is_black(0, y));
            assert!(!image.is_black(image.width - 1, y));
        }
    }

    #[test]
    fn test_build_bitmap_not_blank() {
        let image = build_bitmap("test", 4).unwrap();
        assert!(image.bits.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_native_command_starts_with_alignment() {
        let cmd = build_native_command("https://a", 6, Alignment::Center);
        assert_eq!(&cmd[0..3], &[0x1B, 0x61, 0x01]);
    }

    #[test]
    fn test_native_command_contains_sequence() {
        let cmd = build_native_command("https://a", 6, Alignment::Center);
        // Model select
        assert!(
            cmd.windows(9)
                .any(|w| w == [0x1D, 0x28, 0x6B, 4, 0, 49, 65, 50, 0])
        );
        // Module size 6
        assert!(
            cmd.windows(8)
                .any(|w| w == [0x1D, 0x28, 0x6B, 3, 0, 49, 67, 6])
        );
        // EC level high
        assert!(
            cmd.windows(8)
                .any(|w| w == [0x1D, 0x28, 0x6B, 3, 0, 49, 69, 51])
        );
        // Print
        assert!(
            cmd.windows(8)
                .any(|w| w == [0x1D, 0x28, 0x6B, 3, 0, 49, 81, 48])
        );
    }

    #[test]
    fn test_native_command_truncates_payload() {
        let long = "x".repeat(500);
        let cmd = build_native_command(&long, 6, Alignment::Left);
        // Store frame length = 200 + 3 = 203 = 0x00CB
        assert!(cmd.windows(5).any(|w| w == [0x1D, 0x28, 0x6B, 0xCB, 0x00]));
    }
}
