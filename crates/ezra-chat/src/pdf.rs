//! Minimal PDF 1.4 writer for conversation transcripts.
//!
//! Letter pages, base-14 Helvetica in WinAnsiEncoding, word-wrapped and
//! paginated. Output depends only on its input: no creation date is embedded.
//! Text the fonts cannot show is rejected rather than substituted.

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 54;
const LEADING: u32 = 14;
const BODY_SIZE: u32 = 11;
const TITLE_SIZE: u32 = 14;
/// Average Helvetica glyph at 11pt is about 5.5pt wide; 504pt of text width.
pub(crate) const WRAP_COLUMNS: usize = 88;

const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

/// Typeface of one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Style {
    Title,
    Heading,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    pub style: Style,
    pub text: String,
}

impl Line {
    pub fn new(style: Style, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }

    pub fn blank() -> Self {
        Self::new(Style::Body, String::new())
    }
}

/// A character with no WinAnsiEncoding code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Unencodable(pub char);

/// Render `lines` into a complete PDF file. Long lines are wrapped.
pub(crate) fn render(title: &str, lines: &[Line]) -> Result<Vec<u8>, Unencodable> {
    let wrapped: Vec<Line> = lines
        .iter()
        .flat_map(|line| {
            wrap(&line.text, WRAP_COLUMNS)
                .into_iter()
                .map(move |text| Line::new(line.style, text))
        })
        .collect();

    let pages: Vec<&[Line]> = if wrapped.is_empty() {
        vec![&[][..]]
    } else {
        wrapped.chunks(LINES_PER_PAGE).collect()
    };

    let mut doc = Writer::default();
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 6 + 2 * i).collect();

    doc.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    doc.object(
        2,
        &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()),
    );
    doc.object(
        3,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );
    doc.object(
        4,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );
    doc.object(
        5,
        &format!("<< /Title ({}) /Producer (Ezra) >>", encode(title)?),
    );

    for (page, page_id) in pages.iter().zip(&page_ids) {
        let content_id = page_id + 1;
        doc.object(
            *page_id,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT, content_id
            ),
        );
        let stream = content_stream(page)?;
        doc.object(
            content_id,
            &format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ),
        );
    }

    Ok(doc.finish())
}

fn content_stream(lines: &[Line]) -> Result<String, Unencodable> {
    let mut out = String::new();
    out.push_str("BT\n");
    out.push_str(&format!("{} TL\n", LEADING));
    out.push_str(&format!("{} {} Td\n", MARGIN, PAGE_HEIGHT - MARGIN - LEADING));
    let mut current: Option<Style> = None;
    for line in lines {
        if !line.text.is_empty() && current != Some(line.style) {
            let (font, size) = match line.style {
                Style::Title => ("F2", TITLE_SIZE),
                Style::Heading => ("F2", BODY_SIZE),
                Style::Body => ("F1", BODY_SIZE),
            };
            out.push_str(&format!("/{} {} Tf\n", font, size));
            current = Some(line.style);
        }
        if !line.text.is_empty() {
            out.push_str(&format!("({}) Tj\n", encode(&line.text)?));
        }
        out.push_str("T*\n");
    }
    out.push_str("ET");
    Ok(out)
}

/// Object table plus byte offsets for the cross-reference section.
#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl Writer {
    fn object(&mut self, id: usize, body: &str) {
        if self.buf.is_empty() {
            self.buf.extend_from_slice(b"%PDF-1.4\n");
        }
        self.offsets.push((id, self.buf.len()));
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        self.offsets.sort_unstable();
        let xref_at = self.buf.len();
        let size = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for (_, offset) in &self.offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref_at
        ));
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

/// Greedy word wrap. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        let mut len = 0;
        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > width {
                if len > 0 {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                let rest = chars.split_off(width);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }
            let wlen = chars.len();
            if len > 0 && len + 1 + wlen > width {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            line.extend(chars);
            len += wlen;
        }
        lines.push(line);
    }
    lines
}

/// Encode `text` as the body of a PDF literal string in WinAnsiEncoding.
fn encode(text: &str) -> Result<String, Unencodable> {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match win_ansi(ch).ok_or(Unencodable(ch))? {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b @ 0x20..=0x7e => out.push(b as char),
            b => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    Ok(out)
}

fn win_ansi(ch: char) -> Option<u8> {
    let code = match ch {
        '\t' => b' ',
        ' '..='~' => ch as u8,
        '\u{a0}'..='\u{ff}' => ch as u32 as u8,
        '\u{20ac}' => 0x80,
        '\u{2026}' => 0x85,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        _ => return None,
    };
    Some(code)
}
