//! Vector drawing primitives and their SVG / PDF serializations.
//!
//! Coordinates are in points with the origin at the top-left corner of the
//! page; the PDF writer flips the y axis.

use std::fmt::Write as _;

/// Average Helvetica glyph width relative to the font size.
const HELVETICA_WIDTH: f64 = 0.52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const BLACK: Color = Color(0, 0, 0);
    pub const GREY: Color = Color(150, 150, 150);

    fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    fn pdf(&self) -> String {
        format!(
            "{:.3} {:.3} {:.3}",
            f64::from(self.0) / 255.0,
            f64::from(self.1) / 255.0,
            f64::from(self.2) / 255.0
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Line {
        from: (f64, f64),
        to: (f64, f64),
        width: f64,
        color: Color,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: Color,
    },
    /// `at` is the baseline point of the anchor
    Text {
        at: (f64, f64),
        content: String,
        size: f64,
        anchor: TextAnchor,
    },
}

/// Approximate rendered width of `text` in Helvetica.
pub fn text_width(text: &str, size: f64) -> f64 {
    text.chars().count() as f64 * size * HELVETICA_WIDTH
}

/// A single page of shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub width: f64,
    pub height: f64,
    pub shapes: Vec<Shape>,
}

impl Figure {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            shapes: Vec::new(),
        }
    }

    pub fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Color) {
        self.shapes.push(Shape::Line {
            from,
            to,
            width,
            color,
        });
    }

    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64, fill: Color) {
        self.shapes.push(Shape::Rect {
            x,
            y,
            width,
            height,
            fill,
        });
    }

    pub fn text(&mut self, at: (f64, f64), content: impl Into<String>, size: f64, anchor: TextAnchor) {
        self.shapes.push(Shape::Text {
            at,
            content: content.into(),
            size,
            anchor,
        });
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().filter_map(|s| match s {
            Shape::Text { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    pub fn to_svg(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = fmt_num(self.width),
            h = fmt_num(self.height)
        );
        let _ = writeln!(
            out,
            r##"<rect x="0" y="0" width="{}" height="{}" fill="#ffffff"/>"##,
            fmt_num(self.width),
            fmt_num(self.height)
        );
        for shape in &self.shapes {
            match shape {
                Shape::Line {
                    from,
                    to,
                    width,
                    color,
                } => {
                    let _ = writeln!(
                        out,
                        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{}" stroke-linecap="square"/>"#,
                        fmt_num(from.0),
                        fmt_num(from.1),
                        fmt_num(to.0),
                        fmt_num(to.1),
                        color.hex(),
                        fmt_num(*width)
                    );
                }
                Shape::Rect {
                    x,
                    y,
                    width,
                    height,
                    fill,
                } => {
                    let _ = writeln!(
                        out,
                        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
                        fmt_num(*x),
                        fmt_num(*y),
                        fmt_num(*width),
                        fmt_num(*height),
                        fill.hex()
                    );
                }
                Shape::Text {
                    at,
                    content,
                    size,
                    anchor,
                } => {
                    let anchor = match anchor {
                        TextAnchor::Start => "start",
                        TextAnchor::Middle => "middle",
                        TextAnchor::End => "end",
                    };
                    let _ = writeln!(
                        out,
                        r#"<text x="{}" y="{}" font-family="Helvetica, Arial, sans-serif" font-size="{}" text-anchor="{}">{}</text>"#,
                        fmt_num(at.0),
                        fmt_num(at.1),
                        fmt_num(*size),
                        anchor,
                        escape_xml(content)
                    );
                }
            }
        }
        out.push_str("</svg>\n");
        out
    }

    /// Single-page PDF 1.4 using the built-in Helvetica font.
    pub fn to_pdf(&self) -> Vec<u8> {
        let content = self.pdf_content();
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>",
                fmt_num(self.width),
                fmt_num(self.height)
            ),
            format!(
                "<< /Length {} >>\nstream\n{}endstream",
                content.len(),
                content
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ];

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body);
        }
        let xref = out.len();
        let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            let _ = write!(out, "{:010} 00000 n \n", offset);
        }
        let _ = write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        );
        out.into_bytes()
    }

    fn pdf_content(&self) -> String {
        let mut out = String::new();
        let flip = |y: f64| self.height - y;
        for shape in &self.shapes {
            match shape {
                Shape::Line {
                    from,
                    to,
                    width,
                    color,
                } => {
                    let _ = writeln!(
                        out,
                        "{} RG {} w {} {} m {} {} l S",
                        color.pdf(),
                        fmt_num(*width),
                        fmt_num(from.0),
                        fmt_num(flip(from.1)),
                        fmt_num(to.0),
                        fmt_num(flip(to.1))
                    );
                }
                Shape::Rect {
                    x,
                    y,
                    width,
                    height,
                    fill,
                } => {
                    let _ = writeln!(
                        out,
                        "{} rg {} {} {} {} re f",
                        fill.pdf(),
                        fmt_num(*x),
                        fmt_num(flip(y + height)),
                        fmt_num(*width),
                        fmt_num(*height)
                    );
                }
                Shape::Text {
                    at,
                    content,
                    size,
                    anchor,
                } => {
                    let shift = match anchor {
                        TextAnchor::Start => 0.0,
                        TextAnchor::Middle => text_width(content, *size) / 2.0,
                        TextAnchor::End => text_width(content, *size),
                    };
                    let _ = writeln!(
                        out,
                        "0 g BT /F1 {} Tf {} {} Td ({}) Tj ET",
                        fmt_num(*size),
                        fmt_num(at.0 - shift),
                        fmt_num(flip(at.1)),
                        escape_pdf(content)
                    );
                }
            }
        }
        out
    }
}

/// Two decimals, without trailing zeros.
fn fmt_num(value: f64) -> String {
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" || text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// PDF string literal escaping; characters outside Latin-1 become `?`.
fn escape_pdf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c if (c as u32) >= 0xA0 && (c as u32) <= 0xFF => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}
