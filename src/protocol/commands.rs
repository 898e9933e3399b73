//! # ESC/POS Control Commands
//!
//! This module implements printer initialization, paper feed, and cutter
//! commands for ESC/POS thermal receipt printers.
//!
//! ## Protocol Overview
//!
//! ESC/POS commands are byte sequences starting with escape characters:
//!
//! - Single byte: `LF` (print line buffer and feed)
//! - Two bytes: `ESC @` (initialize)
//! - Multi-byte with parameters: `ESC a n`, `GS V m`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`
//!
//! ## Reference
//!
//! Based on "ESC/POS Application Programming Guide" (Epson), which most
//! 80mm thermal printer clones follow.

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
///
/// Most ESC/POS commands begin with ESC (0x1B). This byte signals the start
/// of a control sequence rather than printable text.
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
///
/// Used for extended commands: character size, cutter, 2D barcodes.
/// Hex: 0x1D, Decimal: 29
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print and advance one line
///
/// Prints any data in the line buffer and advances paper by the current
/// line spacing amount.
pub const LF: u8 = 0x0A;

// ============================================================================
// INITIALIZATION
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Resets the printer to its power-on default state. Sent at the start of
/// each session so a new document never inherits stale formatting.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
/// | Decimal | 27 64 |
///
/// Clears the print buffer and resets emphasis, character size, alignment,
/// and line spacing. Does not clear data stored in NV memory.
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

// ============================================================================
// PAPER FEED
// ============================================================================

/// # Feed n Blank Lines (LF × n)
///
/// Emits `n` line feeds. Used for spacing before a cut and as the fallback
/// when the cutter is unavailable.
#[inline]
pub fn feed_lines(n: u8) -> Vec<u8> {
    vec![LF; n as usize]
}

// ============================================================================
// CUTTER CONTROL
// ============================================================================

/// # Full Cut (GS V 0)
///
/// Performs a full cut at the current paper position.
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS V 0   |
/// | Hex     | 1D 56 00 |
/// | Decimal | 29 86 0  |
///
/// The caller is responsible for feeding the printed content past the
/// cutter first (see [`feed_lines`]); cutting at the current position may
/// otherwise cut through printed text.
#[inline]
pub fn cut_full() -> Vec<u8> {
    vec![GS, b'V', 0]
}

/// # Partial Cut (GS V 1)
///
/// Performs a partial cut, leaving a small "hinge" connecting the receipt
/// to the roll so it can be torn off without falling.
#[inline]
pub fn cut_partial() -> Vec<u8> {
    vec![GS, b'V', 1]
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
///
/// ESC/POS uses little-endian encoding for all multi-byte integers.
///
/// ## Example
///
/// ```
/// use recibo::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(128), [0x80, 0x00]);
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert_eq!(init(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_cut_full() {
        assert_eq!(cut_full(), vec![0x1D, 0x56, 0x00]);
    }

    #[test]
    fn test_cut_partial() {
        assert_eq!(cut_partial(), vec![0x1D, 0x56, 0x01]);
    }

    #[test]
    fn test_feed_lines() {
        assert_eq!(feed_lines(0), Vec::<u8>::new());
        assert_eq!(feed_lines(3), vec![0x0A, 0x0A, 0x0A]);
    }

    #[test]
    fn test_u16_le() {
        assert_eq!(u16_le(0x0000), [0x00, 0x00]);
        assert_eq!(u16_le(0x00FF), [0xFF, 0x00]);
        assert_eq!(u16_le(0xFF00), [0x00, 0xFF]);
        assert_eq!(u16_le(192), [0xC0, 0x00]); // widest QR bitmap: 192 dots
    }
}
