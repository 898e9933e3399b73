//! Persistent text formatting state.
//!
//! ESC/POS styles are sticky: once set they affect every following line.
//! The firmware this bridge replaces mirrors that stickiness in software so
//! it can skip redundant style commands; `FormatState` is that mirror. One
//! instance lives for the duration of one document and is never shared
//! across documents.

use crate::document::schema::FormatDirective;
use crate::protocol::text::Alignment;

/// The persistent formatting state of a document being rendered.
///
/// Defaults to left-aligned, non-bold, normal size, no italic, no
/// underline at the start of every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatState {
    pub align: Alignment,
    pub bold: bool,
    /// 0 = small, 1 = normal, 2 = large.
    pub size: u8,
    pub italic: bool,
    pub underline: bool,
}

impl Default for FormatState {
    fn default() -> Self {
        Self {
            align: Alignment::Left,
            bold: false,
            size: 1,
            italic: false,
            underline: false,
        }
    }
}

/// The subset of fields a directive actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatDelta {
    pub align: Option<Alignment>,
    pub bold: Option<bool>,
    pub size: Option<u8>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
}

impl FormatDelta {
    pub fn is_empty(&self) -> bool {
        *self == FormatDelta::default()
    }
}

impl FormatState {
    /// Apply a format directive, mutating only the fields that are present
    /// *and* differ from the current state, and return the changeset.
    ///
    /// Alignment codes are case-insensitive; unrecognized codes and
    /// out-of-range sizes leave the field untouched. Absent keys never
    /// touch anything, so unknown directive keys are forward-compatible.
    pub fn apply(&mut self, directive: &FormatDirective) -> FormatDelta {
        let mut delta = FormatDelta::default();

        if let Some(code) = directive.a.as_deref()
            && let Some(align) = Alignment::from_code(code)
            && align != self.align
        {
            self.align = align;
            delta.align = Some(align);
        }

        if let Some(flag) = &directive.b {
            let bold = flag.as_bool();
            if bold != self.bold {
                self.bold = bold;
                delta.bold = Some(bold);
            }
        }

        if let Some(size) = directive.s
            && (0..=2).contains(&size)
        {
            let size = size as u8;
            if size != self.size {
                self.size = size;
                delta.size = Some(size);
            }
        }

        if let Some(flag) = &directive.i {
            let italic = flag.as_bool();
            if italic != self.italic {
                self.italic = italic;
                delta.italic = Some(italic);
            }
        }

        if let Some(flag) = &directive.u {
            let underline = flag.as_bool();
            if underline != self.underline {
                self.underline = underline;
                delta.underline = Some(underline);
            }
        }

        delta
    }

    /// Restore the document defaults.
    pub fn reset(&mut self) {
        *self = FormatState::default();
    }
}

// ============================================================================
// TESTS
// ============================================================================
