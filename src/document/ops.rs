//! # Device Operations
//!
//! The operation list is the boundary between rendering and device I/O: a
//! rendered document is a `Vec<Op>` that a printer session executes against
//! whichever backend it holds. Keeping the list inspectable makes the whole
//! rendering pipeline testable without hardware.

use crate::bitmap::BitmapImage;
use crate::document::format::FormatState;
use crate::protocol::text::Alignment;

/// Line graphic styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Solid,
    Dotted,
    Double,
    /// Fallback for unrecognized kinds: plain ASCII dashes.
    Plain,
}

impl LineKind {
    /// Parse the wire name; anything unrecognized draws plain dashes.
    pub fn parse(name: &str) -> Self {
        match name {
            "solid" => LineKind::Solid,
            "dotted" => LineKind::Dotted,
            "double" => LineKind::Double,
            _ => LineKind::Plain,
        }
    }

    /// The character repeated to draw this line.
    pub fn pattern_char(&self) -> char {
        match self {
            LineKind::Solid => '─',
            LineKind::Dotted => '·',
            LineKind::Double => '═',
            LineKind::Plain => '-',
        }
    }

    /// Build the printable line pattern at the given column width.
    pub fn pattern(&self, width: usize) -> String {
        std::iter::repeat_n(self.pattern_char(), width).collect()
    }
}

/// The payload of a QR operation.
#[derive(Debug, Clone, PartialEq)]
pub enum QrPayload {
    /// Text/URL to encode; the session prefers the printer's native QR
    /// command and falls back to a locally rendered bitmap.
    Text(String),
    /// A pre-packed bitmap, printed through the raster path.
    Bitmap(BitmapImage),
}

/// A fully resolved QR directive.
#[derive(Debug, Clone, PartialEq)]
pub struct QrSpec {
    pub payload: QrPayload,
    /// Size class 1-16 from the job message.
    pub size_class: u8,
    pub alignment: Alignment,
}

/// One device operation. Executed in order; the first failure aborts the
/// rest of the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Apply the full persistent formatting state.
    SetFormat(FormatState),
    /// Write literal text (includes its trailing newline).
    WriteText(String),
    /// Draw a horizontal line graphic, centered.
    DrawLine {
        kind: LineKind,
        thickness: u8,
        width: usize,
    },
    /// Print a QR code.
    Qr(QrSpec),
    /// Terminal operation: padding feed plus cut (or extra feed when the
    /// cutter is unavailable), then the atomic job flush.
    Finalize,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_kind_parse() {
        assert_eq!(LineKind::parse("solid"), LineKind::Solid);
        assert_eq!(LineKind::parse("dotted"), LineKind::Dotted);
        assert_eq!(LineKind::parse("double"), LineKind::Double);
        assert_eq!(LineKind::parse("wavy"), LineKind::Plain);
    }

    #[test]
    fn test_line_patterns() {
        assert_eq!(LineKind::Solid.pattern(4), "────");
        assert_eq!(LineKind::Dotted.pattern(3), "···");
        assert_eq!(LineKind::Double.pattern(2), "══");
        assert_eq!(LineKind::Plain.pattern(5), "-----");
    }
}
