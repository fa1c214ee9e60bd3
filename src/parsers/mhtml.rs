//! MHTML 流式解析器
//!
//! 按 RFC 2822 风格逐行消费 multipart/related 字节流，构建以
//! Content-Location 为键的资源表和以 Content-ID 为键的框架表。
//! 主体以线上原始形式保存，解码推迟到嵌入阶段。

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::core::{MhtmlError, Result};

/// Declared `Content-Transfer-Encoding` of a part.
///
/// Unknown labels fall back to `Binary` (identity decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    SevenBit,
    EightBit,
    Binary,
}

impl TransferEncoding {
    pub fn from_label(label: &str) -> TransferEncoding {
        match label.trim().to_lowercase().as_str() {
            "base64" => TransferEncoding::Base64,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            "7bit" => TransferEncoding::SevenBit,
            "8bit" => TransferEncoding::EightBit,
            _ => TransferEncoding::Binary,
        }
    }
}

/// One captured asset of the archive.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Body text in its raw on-the-wire form (still transfer-encoded).
    pub data: String,
    /// MIME type without the `charset=` parameter, lowercased.
    pub media_type: String,
    /// Declared charset, or empty when the part carried none.
    pub charset: String,
    pub transfer_encoding: TransferEncoding,
    pub content_id: Option<String>,
    pub location: Option<String>,
}

/// Insertion-ordered URL → resource table.
///
/// The first part claiming a URL wins; iteration follows part order, which
/// the filename-tail resolution strategy relies on.
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    entries: HashMap<String, Rc<Resource>>,
    order: Vec<String>,
}

impl ResourceMap {
    /// Register a resource under `key` unless the key is already taken.
    /// Returns whether the resource was inserted.
    pub fn insert(&mut self, key: String, resource: Rc<Resource>) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.entries.insert(key, resource);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Rc<Resource>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Rc<Resource>)> {
        self.order.iter().map(move |key| (key, &self.entries[key]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// The parsed archive: index URL plus the two lookup tables. Frames and
/// media may share resources; both hold counted references.
#[derive(Debug, Clone)]
pub struct MhtmlArchive {
    pub index: String,
    pub media: ResourceMap,
    pub frames: HashMap<String, Rc<Resource>>,
}

/// Split a `Content-Type` header value into media type and charset.
pub fn parse_content_type(value: &str) -> (String, String) {
    let mut media_type = String::new();
    let mut charset = String::new();

    let parts: Vec<&str> = value.split(';').collect();

    if !parts.is_empty() {
        media_type = parts[0].trim().to_lowercase();
    }

    for part in parts.iter().skip(1) {
        let part = part.trim();
        if part.len() >= 8 && part[..8].eq_ignore_ascii_case("charset=") {
            charset = part[8..].trim_matches('"').to_string();
        }
    }

    (media_type, charset)
}

/// Extract the `boundary=` parameter of the envelope `Content-Type`,
/// stripping surrounding quotes if present.
fn boundary_parameter(value: &str) -> Option<String> {
    for part in value.split(';').skip(1) {
        let part = part.trim();
        if part.len() >= 9 && part[..9].eq_ignore_ascii_case("boundary=") {
            let boundary = part[9..].trim_matches('"');
            if !boundary.is_empty() {
                return Some(boundary.to_string());
            }
        }
    }
    None
}

/// Line cursor over the input text. Lines terminate at LF; a trailing CR is
/// discarded, so `\r\n` and `\n` terminators may be freely mixed.
struct LineCursor<'a> {
    input: &'a str,
    pos: usize,
    line_no: usize,
}

impl<'a> LineCursor<'a> {
    fn new(input: &'a str) -> Self {
        LineCursor {
            input,
            pos: 0,
            line_no: 0,
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        if self.pos >= self.input.len() {
            return None;
        }

        let rest = &self.input[self.pos..];
        let line = match rest.find('\n') {
            Some(nl) => {
                self.pos += nl + 1;
                &rest[..nl]
            }
            None => {
                self.pos = self.input.len();
                rest
            }
        };
        self.line_no += 1;

        Some(line.strip_suffix('\r').unwrap_or(line))
    }
}

/// Read one RFC-2822-style header block, unfolding continuation lines
/// (a line starting with whitespace extends the previous header's value).
///
/// Returns the lowercased name/value pairs and whether the block was
/// terminated by a blank line (as opposed to running into end-of-input).
fn read_header_block(cursor: &mut LineCursor) -> (Vec<(String, String)>, bool) {
    let mut headers: Vec<(String, String)> = Vec::new();

    while let Some(line) = cursor.next_line() {
        if line.trim().is_empty() {
            return (headers, true);
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.1.push_str(line.trim());
            }
        } else if let Some(colon) = line.find(':') {
            let name = line[..colon].trim().to_lowercase();
            let value = line[colon + 1..].trim().to_string();
            headers.push((name, value));
        }
        // Lines without a colon that are not continuations are skipped
    }

    (headers, false)
}

fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Best-effort UTF-8 normalization of an accumulated body: the
/// percent-encode-then-decode round trip of the original, expressed as a
/// byte reinterpretation. Code points above U+00FF or byte sequences that
/// are not valid UTF-8 leave the body untouched.
fn normalize_utf8(body: &str) -> Option<String> {
    if body.is_ascii() {
        return None;
    }
    if !body.chars().all(|c| (c as u32) <= 0xFF) {
        return None;
    }

    let bytes: Vec<u8> = body.chars().map(|c| c as u8).collect();
    String::from_utf8(bytes).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    TopHeaders,
    PartHeaders,
    PartBody,
    End,
}

/// What a single pass over the stream produced.
#[derive(Debug)]
pub(crate) enum ParseOutcome {
    Archive(MhtmlArchive),
    /// `html_only` short-circuit: the first HTML part, body complete,
    /// remainder of the stream discarded.
    HtmlOnly(Rc<Resource>),
}

/// Headers of the part currently being assembled, carried between the
/// `PartHeaders` and `PartBody` states.
struct PendingPart {
    media_type: String,
    charset: String,
    transfer_encoding: TransferEncoding,
    content_id: Option<String>,
    location: Option<String>,
    /// Lenient mode keeps consuming the body of an invalid part to stay
    /// aligned with the boundary, then discards it.
    dropped: bool,
}

/// Walk the stream with the four-state machine
/// `TopHeaders → PartHeaders ⇄ PartBody → End`.
///
/// A line terminates a body when it contains the boundary token as a
/// substring; this inherits the capture-time assumption that boundaries are
/// chosen to be unambiguous. End-of-stream detection is input exhaustion,
/// so a missing closing boundary still yields the archive built so far.
pub(crate) fn parse_stream(text: &str, strict: bool, html_only: bool) -> Result<ParseOutcome> {
    let mut cursor = LineCursor::new(text);
    let mut state = ParserState::TopHeaders;

    let mut boundary = String::new();
    let mut media = ResourceMap::default();
    let mut frames: HashMap<String, Rc<Resource>> = HashMap::new();
    let mut index: Option<String> = None;
    let mut pending: Option<PendingPart> = None;

    loop {
        match state {
            ParserState::TopHeaders => {
                let (headers, terminated) = read_header_block(&mut cursor);
                if !terminated {
                    return Err(MhtmlError::InvalidArchive(
                        "unterminated envelope header block".to_string(),
                    ));
                }

                let content_type = get_header(&headers, "content-type").ok_or_else(|| {
                    MhtmlError::InvalidArchive("envelope is missing Content-Type".to_string())
                })?;
                let (envelope_type, _) = parse_content_type(&content_type);
                if !envelope_type.starts_with("multipart/") {
                    return Err(MhtmlError::InvalidArchive(format!(
                        "envelope Content-Type is {envelope_type}, expected multipart/*"
                    )));
                }
                boundary = boundary_parameter(&content_type).ok_or_else(|| {
                    MhtmlError::InvalidArchive(
                        "envelope Content-Type has no boundary parameter".to_string(),
                    )
                })?;

                // Consume whitespace, then require the first boundary marker
                loop {
                    match cursor.next_line() {
                        Some(line) if line.trim().is_empty() => continue,
                        Some(line) if line.contains(&boundary) => break,
                        Some(line) => {
                            return Err(MhtmlError::InvalidArchive(format!(
                                "expected first boundary marker, found {line:?}"
                            )));
                        }
                        None => {
                            return Err(MhtmlError::InvalidArchive(
                                "stream ends before the first boundary marker".to_string(),
                            ));
                        }
                    }
                }

                state = ParserState::PartHeaders;
            }

            ParserState::PartHeaders => {
                let block_line = cursor.line_no + 1;
                let (headers, terminated) = read_header_block(&mut cursor);

                // An empty block follows the closing boundary: only
                // end-of-input or epilogue text is left.
                if headers.is_empty() {
                    state = ParserState::End;
                    continue;
                }
                if !terminated {
                    if strict {
                        return Err(MhtmlError::UnexpectedEof {
                            line: cursor.line_no,
                        });
                    }
                    warn!(
                        line = block_line,
                        "stream ended inside a part header block; dropping partial part"
                    );
                    state = ParserState::End;
                    continue;
                }

                let content_type = get_header(&headers, "content-type");
                let encoding_label = get_header(&headers, "content-transfer-encoding");
                let content_id = get_header(&headers, "content-id");
                let location = get_header(&headers, "content-location");

                let missing: Option<&'static str> = if content_type.is_none() {
                    Some("Content-Type")
                } else if encoding_label.is_none() {
                    Some("Content-Transfer-Encoding")
                } else if content_id.is_none() && location.is_none() {
                    Some("Content-ID or Content-Location")
                } else {
                    None
                };

                if let Some(missing) = missing {
                    if strict {
                        return Err(MhtmlError::MissingPartHeader {
                            line: block_line,
                            missing,
                        });
                    }
                    warn!(line = block_line, missing, "dropping part with incomplete headers");
                    pending = Some(PendingPart {
                        media_type: String::new(),
                        charset: String::new(),
                        transfer_encoding: TransferEncoding::Binary,
                        content_id: None,
                        location: None,
                        dropped: true,
                    });
                } else {
                    let (media_type, charset) = parse_content_type(&content_type.unwrap());
                    pending = Some(PendingPart {
                        media_type,
                        charset,
                        transfer_encoding: TransferEncoding::from_label(&encoding_label.unwrap()),
                        content_id,
                        location,
                        dropped: false,
                    });
                }

                state = ParserState::PartBody;
            }

            ParserState::PartBody => {
                let mut body = String::new();
                let mut reached_eof = false;

                loop {
                    match cursor.next_line() {
                        None => {
                            reached_eof = true;
                            break;
                        }
                        // The boundary line itself never joins the body
                        Some(line) if line.contains(&boundary) => break,
                        Some(line) => {
                            body.push_str(line);
                            body.push('\n');
                        }
                    }
                }

                if let Some(normalized) = normalize_utf8(&body) {
                    body = normalized;
                }

                let part = pending.take().expect("entered PartBody without headers");
                if !part.dropped {
                    let resource = Rc::new(Resource {
                        data: body,
                        media_type: part.media_type,
                        charset: part.charset,
                        transfer_encoding: part.transfer_encoding,
                        content_id: part.content_id.clone(),
                        location: part.location.clone(),
                    });

                    if let Some(location) = part.location {
                        if index.is_none() && resource.media_type == "text/html" {
                            index = Some(location.clone());
                        }
                        if !media.insert(location.clone(), resource.clone()) {
                            debug!(url = %location, "duplicate Content-Location; keeping first occurrence");
                        }
                    }
                    if let Some(content_id) = part.content_id {
                        frames.insert(content_id, resource.clone());
                    }

                    if html_only && resource.media_type == "text/html" {
                        return Ok(ParseOutcome::HtmlOnly(resource));
                    }
                }

                state = if reached_eof {
                    ParserState::End
                } else {
                    ParserState::PartHeaders
                };
            }

            ParserState::End => break,
        }
    }

    let index = index.ok_or_else(|| {
        MhtmlError::InvalidArchive(
            "archive contains no text/html part with a Content-Location".to_string(),
        )
    })?;

    Ok(ParseOutcome::Archive(MhtmlArchive {
        index,
        media,
        frames,
    }))
}
