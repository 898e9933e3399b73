//! # ESC/POS Bit Image Commands
//!
//! This module implements the raster band command used to print 1-bit
//! images (QR bitmaps) on ESC/POS thermal printers.
//!
//! ## Graphics Mode
//!
//! The bridge uses 8-dot single-density bit image mode (`ESC * 0`). An
//! image taller than 8 rows is printed as a sequence of bands, each band
//! covering up to 8 scanlines.
//!
//! ## Coordinate System
//!
//! ```text
//! (0,0) ──────────────────────► X (columns, one byte per column)
//!   │
//!   │   ████████  ← band of 8 scanlines
//!   ▼
//!   Y (paper feed direction)
//! ```
//!
//! ## Column Packing
//!
//! Unlike row-major packed bitmaps, `ESC *` data is **column-major within a
//! band**: each data byte holds 8 *vertical* pixels of one column, with
//! bit 0 being the *top* scanline of the band:
//!
//! ```text
//! Byte value 0x01 = top scanline only      ▀
//! Byte value 0x80 = bottom scanline only   ▄
//! Byte value 0xFF = full 8-dot column      █
//! ```
//!
//! Converting from the row-major [`crate::bitmap::BitmapImage`] layout into
//! this column layout is done by [`crate::bitmap::BitmapImage::to_raster_commands`];
//! this module only frames already-packed column bytes.

use super::commands::{ESC, LF, u16_le};

/// # Print 8-Dot Single-Density Band (ESC * 0 nL nH d1...dk)
///
/// Prints one band of up to 8 scanlines. `columns` must contain exactly
/// `width` bytes, one per column, packed as described in the module docs.
/// A line feed is appended so consecutive bands stack without overlap.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC * 0 nL nH d1...dk LF |
/// | Hex     | 1B 2A 00 nL nH d1...dk 0A |
/// | Decimal | 27 42 0 nL nH d1...dk 10 |
///
/// ## Parameters
///
/// - `width`: Number of columns (dots), little-endian encoded as nL/nH
/// - `columns`: One packed byte per column
///
/// ## Example
///
/// ```
/// use recibo::protocol::graphics;
///
/// // A 64-dot wide solid band
/// let cmd = graphics::band(64, &[0xFF; 64]);
/// assert_eq!(&cmd[0..5], &[0x1B, 0x2A, 0x00, 64, 0x00]);
/// assert_eq!(cmd.len(), 5 + 64 + 1); // header + columns + LF
/// ```
pub fn band(width: u16, columns: &[u8]) -> Vec<u8> {
    debug_assert!(
        columns.len() == width as usize,
        "Band data must be exactly one byte per column. Expected {}, got {}",
        width,
        columns.len()
    );

    let [nl, nh] = u16_le(width);

    let mut cmd = Vec::with_capacity(6 + columns.len());
    cmd.push(ESC);
    cmd.push(b'*');
    cmd.push(0); // m = 0 (8-dot single density)
    cmd.push(nl);
    cmd.push(nh);
    cmd.extend_from_slice(columns);
    cmd.push(LF);
    cmd
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_header() {
        let cmd = band(8, &[0xAA; 8]);
        assert_eq!(cmd[0], 0x1B); // ESC
        assert_eq!(cmd[1], 0x2A); // '*'
        assert_eq!(cmd[2], 0x00); // single density
        assert_eq!(cmd[3], 8); // nL
        assert_eq!(cmd[4], 0); // nH
    }

    #[test]
    fn test_band_trailing_linefeed() {
        let cmd = band(4, &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(*cmd.last().unwrap(), 0x0A);
    }

    #[test]
    fn test_band_preserves_columns() {
        let columns: Vec<u8> = (0..192).map(|i| (i % 256) as u8).collect();
        let cmd = band(192, &columns);
        assert_eq!(&cmd[5..5 + 192], &columns[..]);
    }

    #[test]
    fn test_band_wide_width_encoding() {
        // Width above 255 exercises the high byte
        let columns = vec![0x00; 300];
        let cmd = band(300, &columns);
        // 300 = 0x012C -> nL = 0x2C, nH = 0x01
        assert_eq!(cmd[3], 0x2C);
        assert_eq!(cmd[4], 0x01);
    }
}
