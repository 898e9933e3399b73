//! JSON schema types for inbound print jobs.
//!
//! Job messages come from server infrastructure that also feeds embedded
//! firmware, so the element shapes are terse and, in places, legacy-laden
//! (three generations of QR directive coexist). Parsing is deliberately
//! lenient: every directive field is optional and boolean-ish fields accept
//! bools, integers, and strings.

use serde::Deserialize;

use crate::bitmap::BitmapImage;
use crate::error::Result;

fn default_order_id() -> String {
    "unknown".to_string()
}

fn default_page() -> u32 {
    1
}

/// Top-level print job message (topic suffix `p`).
#[derive(Debug, Clone, Deserialize)]
pub struct JobMessage {
    #[serde(default = "default_order_id")]
    pub order_id: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page")]
    pub total_pages: u32,
    /// Ordered receipt elements. Consumed once, never persisted.
    #[serde(default)]
    pub receipt_data: Vec<Element>,
}

/// One receipt element: either a literal text line or a directive object.
///
/// Directive objects carry any combination of keys; the renderer resolves
/// them with a fixed mutually-exclusive precedence
/// (page meta > order meta > format > line > QR).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Element {
    Text(String),
    Directive(Directive),
    /// Anything else (numbers, arrays, null). Logged and skipped.
    Other(serde_json::Value),
}

/// A directive object. All keys optional; unknown keys ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Directive {
    /// Formatting change: `{"f": {"a": "c", "b": true, "s": 2}}`
    #[serde(default)]
    pub f: Option<FormatDirective>,
    /// Line graphic: `{"line": "solid"}` or `{"line": {"type": ...}}`
    #[serde(default)]
    pub line: Option<LineSpec>,
    /// QR as a pre-packed bitmap.
    #[serde(default)]
    pub qr_bitmap: Option<BitmapSpec>,
    /// QR as a URL/text payload.
    #[serde(default)]
    pub qr_url: Option<String>,
    /// Size class 1-16 for either QR form.
    #[serde(default)]
    pub qr_size: Option<u8>,
    /// `"left" | "center" | "right"` for either QR form.
    #[serde(default)]
    pub qr_alignment: Option<String>,
    /// Legacy QR: bare string or `{"text": ...}` / `{"url": ...}`.
    #[serde(default)]
    pub qr: Option<LegacyQr>,
    /// Metadata: `{"m": {"order_id": "A1"}}`
    #[serde(default)]
    pub m: Option<Meta>,
    /// Page metadata, paired with `of`: `{"page": 1, "of": 2}`
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub of: Option<u32>,
}

impl Directive {
    /// Whether any of the three QR key generations is present.
    pub fn has_qr(&self) -> bool {
        self.qr_bitmap.is_some() || self.qr_url.is_some() || self.qr.is_some()
    }
}

/// Formatting keys. Single letters match the firmware's wire format:
/// `a`lign, `b`old, `s`ize, `i`talic, `u`nderline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatDirective {
    #[serde(default)]
    pub a: Option<String>,
    #[serde(default)]
    pub b: Option<Flag>,
    #[serde(default)]
    pub s: Option<i64>,
    #[serde(default)]
    pub i: Option<Flag>,
    #[serde(default)]
    pub u: Option<Flag>,
}

/// A boolean that may arrive as a bool, an integer, or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    pub fn as_bool(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(n) => *n != 0,
            Flag::Text(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        }
    }
}

/// Line directive value: a kind shorthand or a detailed object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LineSpec {
    Kind(String),
    Detailed(LineDetail),
}

/// Detailed line form. Missing fields take the shorthand defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineDetail {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub thickness: Option<u8>,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub spacing: Option<u8>,
}

impl LineSpec {
    /// Resolve to `(kind, thickness, width)` with the firmware defaults
    /// (solid, 2 rows thick, 48 columns wide).
    pub fn resolve(&self) -> (String, u8, usize) {
        match self {
            LineSpec::Kind(kind) => (kind.clone(), 2, 48),
            LineSpec::Detailed(d) => (
                d.kind.clone().unwrap_or_else(|| "solid".to_string()),
                d.thickness.unwrap_or(2),
                d.width.unwrap_or(48),
            ),
        }
    }
}

/// Legacy QR value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LegacyQr {
    Text(String),
    Structured {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl LegacyQr {
    /// The encoded payload, if the value carries one.
    pub fn payload(&self) -> Option<&str> {
        match self {
            LegacyQr::Text(s) => Some(s),
            LegacyQr::Structured { text, url } => text.as_deref().or(url.as_deref()),
        }
    }
}

/// Pre-packed QR bitmap payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BitmapSpec {
    pub width: u16,
    pub height: u16,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl BitmapSpec {
    /// Validate and convert into a [`BitmapImage`].
    pub fn to_image(&self) -> Result<BitmapImage> {
        if let Some(encoding) = &self.encoding
            && encoding != "bitmap_1bit_packed"
        {
            tracing::warn!(encoding, "unexpected bitmap encoding, assuming 1-bit packed");
        }
        BitmapImage::from_packed(self.width, self.height, self.data.clone())
    }
}

/// Metadata directive body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub order_id: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
