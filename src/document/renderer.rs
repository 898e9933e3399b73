//! # Document Renderer
//!
//! Interprets the ordered element list of one job against the persistent
//! [`FormatState`], producing the operation list a printer session
//! executes.
//!
//! ## Element Precedence
//!
//! Directive objects may carry several keys at once. They are resolved with
//! a fixed, mutually exclusive precedence — each element is exactly one of:
//!
//! ```text
//! page meta  >  order meta  >  format  >  line  >  QR
//! ```
//!
//! ## Rules
//!
//! - At most **one QR per document**: the first QR-bearing element wins,
//!   later ones are no-ops. This mirrors the firmware's dedup rule.
//! - Text lines beginning with `"QR:"` are suppressed (legacy filter for
//!   servers that send the QR payload both as a directive and as text).
//! - Elements with unknown shapes are logged and skipped; they never abort
//!   the document.
//! - A `Finalize` operation is always appended, even for empty documents.

use tracing::{debug, warn};

use crate::document::format::FormatState;
use crate::document::ops::{LineKind, Op, QrPayload, QrSpec};
use crate::document::schema::{Directive, Element};
use crate::protocol::text::Alignment;

/// Reserved prefix marking a text line as a QR payload echo.
const QR_TEXT_PREFIX: &str = "QR:";

/// Renders one document. Create a fresh renderer per job; formatting state
/// and the QR dedup flag must never leak across documents.
#[derive(Debug)]
pub struct DocumentRenderer {
    format: FormatState,
    /// Last formatting state actually emitted as an op. Re-emitting an
    /// identical state would be a no-op on the device, so it is skipped;
    /// cleared after ops that disturb device alignment (lines, QR codes).
    last_applied: Option<FormatState>,
    qr_emitted: bool,
    order_id: Option<String>,
    page: u32,
    total_pages: u32,
}

impl Default for DocumentRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRenderer {
    pub fn new() -> Self {
        Self {
            format: FormatState::default(),
            last_applied: None,
            qr_emitted: false,
            order_id: None,
            page: 1,
            total_pages: 1,
        }
    }

    /// Render the element list into an operation list. Consumes the
    /// renderer: one renderer, one document.
    pub fn render(mut self, elements: &[Element]) -> Vec<Op> {
        let mut ops = Vec::new();

        for (index, element) in elements.iter().enumerate() {
            match element {
                Element::Text(text) => self.render_text(&mut ops, text),
                Element::Directive(directive) => self.render_directive(&mut ops, directive, index),
                Element::Other(value) => {
                    warn!(index, %value, "skipping element with unknown shape");
                }
            }
        }

        ops.push(Op::Finalize);
        debug!(
            order_id = ?self.order_id,
            page = self.page,
            total_pages = self.total_pages,
            ops = ops.len(),
            "document rendered"
        );
        ops
    }

    fn render_text(&mut self, ops: &mut Vec<Op>, text: &str) {
        if text.starts_with(QR_TEXT_PREFIX) {
            debug!(text, "suppressing QR payload echo line");
            return;
        }

        self.push_format(ops);
        ops.push(Op::WriteText(format!("{}\n", text)));
    }

    fn render_directive(&mut self, ops: &mut Vec<Op>, directive: &Directive, index: usize) {
        // Page metadata: context only, nothing printed.
        if let (Some(page), Some(of)) = (directive.page, directive.of) {
            self.page = page;
            self.total_pages = of;
            debug!(page, of, "page metadata");
            return;
        }

        // Order metadata: context only.
        if let Some(meta) = &directive.m {
            if let Some(order_id) = &meta.order_id {
                debug!(order_id, "order metadata");
                self.order_id = Some(order_id.clone());
            }
            return;
        }

        if let Some(format) = &directive.f {
            let delta = self.format.apply(format);
            if !delta.is_empty() {
                debug!(?delta, "format change");
                self.push_format(ops);
            }
            return;
        }

        if let Some(line) = &directive.line {
            let (kind, thickness, width) = line.resolve();
            ops.push(Op::DrawLine {
                kind: LineKind::parse(&kind),
                thickness,
                width,
            });
            // The line is drawn centered; the device alignment no longer
            // matches the tracked state.
            self.last_applied = None;
            return;
        }

        if directive.has_qr() {
            if self.qr_emitted {
                debug!(index, "dropping duplicate QR element");
                return;
            }
            if let Some(spec) = self.resolve_qr(directive) {
                ops.push(Op::Qr(spec));
                self.qr_emitted = true;
                self.last_applied = None;
            }
            return;
        }

        warn!(index, "skipping directive with no recognized keys");
    }

    /// Resolve the three QR directive generations, newest first. Returns
    /// `None` for an undecodable bitmap (the element is skipped and the
    /// document's QR slot stays open).
    fn resolve_qr(&self, directive: &Directive) -> Option<QrSpec> {
        let size_class = directive.qr_size.unwrap_or(10);
        let alignment = directive
            .qr_alignment
            .as_deref()
            .map(Alignment::from_name_or_center)
            .unwrap_or(Alignment::Center);

        if let Some(spec) = &directive.qr_bitmap {
            match spec.to_image() {
                Ok(image) => {
                    return Some(QrSpec {
                        payload: QrPayload::Bitmap(image),
                        size_class,
                        alignment,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "skipping invalid QR bitmap");
                    return None;
                }
            }
        }

        if let Some(url) = &directive.qr_url {
            return Some(QrSpec {
                payload: QrPayload::Text(url.clone()),
                size_class,
                alignment,
            });
        }

        if let Some(legacy) = &directive.qr {
            if let Some(payload) = legacy.payload() {
                return Some(QrSpec {
                    payload: QrPayload::Text(payload.to_string()),
                    size_class: 10,
                    alignment: Alignment::Center,
                });
            }
            warn!("skipping legacy QR directive without payload");
        }

        None
    }

    /// Emit a SetFormat op unless the device already holds this exact
    /// state.
    fn push_format(&mut self, ops: &mut Vec<Op>) {
        if self.last_applied != Some(self.format) {
            ops.push(Op::SetFormat(self.format));
            self.last_applied = Some(self.format);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(json: &str) -> Vec<Op> {
        let elements: Vec<Element> = serde_json::from_str(json).unwrap();
        DocumentRenderer::new().render(&elements)
    }

    #[test]
    fn test_format_then_text() {
        let ops = render(r#"[{"f": {"a": "c", "b": true, "s": 2}}, "HELLO"]"#);
        assert_eq!(
            ops,
            vec![
                Op::SetFormat(FormatState {
                    align: Alignment::Center,
                    bold: true,
                    size: 2,
                    italic: false,
                    underline: false,
                }),
                Op::WriteText("HELLO\n".to_string()),
                Op::Finalize,
            ]
        );
    }

    #[test]
    fn test_empty_document_still_finalizes() {
        assert_eq!(render("[]"), vec![Op::Finalize]);
    }

    #[test]
    fn test_plain_text_applies_default_format() {
        let ops = render(r#"["hi"]"#);
        assert_eq!(
            ops,
            vec![
                Op::SetFormat(FormatState::default()),
                Op::WriteText("hi\n".to_string()),
                Op::Finalize,
            ]
        );
    }

    #[test]
    fn test_consecutive_text_reuses_format() {
        let ops = render(r#"["one", "two"]"#);
        // One SetFormat covers both lines
        let set_formats = ops.iter().filter(|op| matches!(op, Op::SetFormat(_))).count();
        assert_eq!(set_formats, 1);
        assert_eq!(ops.len(), 4);
    }

    #[test]
    fn test_redundant_format_directive_emits_nothing() {
        let ops = render(r#"[{"f": {"a": "c"}}, {"f": {"a": "c"}}, "x"]"#);
        let set_formats = ops.iter().filter(|op| matches!(op, Op::SetFormat(_))).count();
        assert_eq!(set_formats, 1);
    }

    #[test]
    fn test_qr_text_prefix_suppressed() {
        let ops = render(r#"["QR: http://x"]"#);
        assert_eq!(ops, vec![Op::Finalize]);
    }

    #[test]
    fn test_first_qr_wins() {
        let ops = render(r#"[{"qr_url": "https://a"}, {"qr_url": "https://b"}]"#);
        let qrs: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Qr(spec) => Some(spec),
                _ => None,
            })
            .collect();
        assert_eq!(qrs.len(), 1);
        assert_eq!(qrs[0].payload, QrPayload::Text("https://a".to_string()));
    }

    #[test]
    fn test_qr_dedup_spans_generations() {
        // A legacy QR after a qr_url is still a duplicate.
        let ops = render(r#"[{"qr_url": "https://a"}, {"qr": "https://b"}]"#);
        let qrs = ops.iter().filter(|op| matches!(op, Op::Qr(_))).count();
        assert_eq!(qrs, 1);
    }

    #[test]
    fn test_invalid_bitmap_does_not_consume_qr_slot() {
        // First element: bitmap with a bad length. Second: valid URL QR.
        let ops = render(
            r#"[
                {"qr_bitmap": {"width": 8, "height": 2, "data": [255]}},
                {"qr_url": "https://a"}
            ]"#,
        );
        let qrs = ops.iter().filter(|op| matches!(op, Op::Qr(_))).count();
        assert_eq!(qrs, 1);
    }

    #[test]
    fn test_line_directive() {
        let ops = render(r#"[{"line": "solid"}]"#);
        assert_eq!(
            ops,
            vec![
                Op::DrawLine {
                    kind: LineKind::Solid,
                    thickness: 2,
                    width: 48,
                },
                Op::Finalize,
            ]
        );
    }

    #[test]
    fn test_line_resets_format_tracking() {
        // Text, line, text with unchanged format: the second text needs a
        // fresh SetFormat because the line recentered the device.
        let ops = render(r#"["a", {"line": "solid"}, "b"]"#);
        let set_formats = ops.iter().filter(|op| matches!(op, Op::SetFormat(_))).count();
        assert_eq!(set_formats, 2);
    }

    #[test]
    fn test_page_and_order_meta_emit_nothing() {
        let ops = render(r#"[{"page": 1, "of": 3}, {"m": {"order_id": "A1"}}]"#);
        assert_eq!(ops, vec![Op::Finalize]);
    }

    #[test]
    fn test_precedence_is_mutually_exclusive() {
        // A pathological element combining format and QR keys: format wins,
        // the QR keys are ignored.
        let ops = render(r#"[{"f": {"a": "c"}, "qr_url": "https://a"}]"#);
        assert!(ops.iter().all(|op| !matches!(op, Op::Qr(_))));
    }

    #[test]
    fn test_unknown_element_skipped() {
        let ops = render(r#"[42, "ok"]"#);
        assert_eq!(ops.len(), 3); // SetFormat + WriteText + Finalize
    }

    #[test]
    fn test_legacy_qr_defaults() {
        let ops = render(r#"[{"qr": {"text": "hello"}}]"#);
        let Op::Qr(spec) = &ops[0] else {
            panic!("expected QR op");
        };
        assert_eq!(spec.size_class, 10);
        assert_eq!(spec.alignment, Alignment::Center);
    }

    #[test]
    fn test_qr_alignment_parsed() {
        let ops = render(r#"[{"qr_url": "https://a", "qr_size": 4, "qr_alignment": "left"}]"#);
        let Op::Qr(spec) = &ops[0] else {
            panic!("expected QR op");
        };
        assert_eq!(spec.size_class, 4);
        assert_eq!(spec.alignment, Alignment::Left);
    }
}
