use markup5ever_rcdom::RcDom;
use thiserror::Error;

use crate::parsers::html::dom::html_to_dom;
use crate::parsers::html::walker::{preprocess_html, walk};
use crate::parsers::mhtml::{parse_stream, MhtmlArchive, ParseOutcome};
use crate::utils::encoding::decode_resource_text;

// 公共 API：parse 构建归档，convert 产出自包含的 DOM

/// Errors produced while parsing or converting an archive.
///
/// Unresolvable references are not errors: they are preserved verbatim in
/// the output.
#[derive(Error, Debug)]
pub enum MhtmlError {
    /// The input violates the archive's structural invariants.
    #[error("invalid MHTML archive: {0}")]
    InvalidArchive(String),

    /// The stream ended while the parser was inside a header block
    /// (surfaced in strict mode only).
    #[error("unexpected end of input at line {line}")]
    UnexpectedEof { line: usize },

    /// A part lacks one of its mandatory headers (surfaced in strict mode;
    /// lenient mode drops the part).
    #[error("part at line {line} is missing {missing}")]
    MissingPartHeader { line: usize, missing: &'static str },

    /// A base64 or quoted-printable body could not be decoded.
    #[error("transfer decoding failed: {0}")]
    DecodeFailure(String),
}

/// Convenience alias for `Result<T, MhtmlError>`.
pub type Result<T> = std::result::Result<T, MhtmlError>;

/// DOM 提供者能力：把 HTML 字符串解析为可变的元素树。
///
/// Injected so the rewriter stays free of any particular parser backend;
/// tests can supply a lightweight implementation.
pub trait DomProvider {
    fn parse_dom(&self, html: &str) -> RcDom;
}

/// Default provider backed by html5ever.
pub struct Html5everProvider;

impl DomProvider for Html5everProvider {
    fn parse_dom(&self, html: &str) -> RcDom {
        html_to_dom(html.as_bytes(), "utf-8")
    }
}

/// Options controlling `parse`.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Stop at the first HTML part and return only its DOM, discarding the
    /// rest of the stream.
    pub html_only: bool,
    /// Fail on structurally damaged parts instead of dropping them.
    pub strict: bool,
}

/// Options controlling `convert`.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Recursively inline `cid:` iframes as `data:text/html` documents;
    /// disabled by default.
    pub convert_iframes: bool,
}

/// Output of `parse`: the full archive, or just the root document's DOM
/// when `html_only` is set.
pub enum ParsedMhtml {
    Archive(MhtmlArchive),
    Document(RcDom),
}

impl std::fmt::Debug for ParsedMhtml {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParsedMhtml::Archive(archive) => f.debug_tuple("Archive").field(archive).finish(),
            ParsedMhtml::Document(_) => f.debug_tuple("Document").field(&"RcDom").finish(),
        }
    }
}

/// Parse an MHTML text into an archive (or, with `html_only`, the DOM of
/// its first HTML part) using the default DOM provider.
pub fn parse(text: &str, options: &ParseOptions) -> Result<ParsedMhtml> {
    parse_with_provider(text, options, &Html5everProvider)
}

pub fn parse_with_provider(
    text: &str,
    options: &ParseOptions,
    parse_dom: &dyn DomProvider,
) -> Result<ParsedMhtml> {
    match parse_stream(text, options.strict, options.html_only)? {
        ParseOutcome::Archive(archive) => Ok(ParsedMhtml::Archive(archive)),
        ParseOutcome::HtmlOnly(resource) => {
            let html = decode_resource_text(&resource)?;
            let dom = parse_dom.parse_dom(&preprocess_html(&html));
            Ok(ParsedMhtml::Document(dom))
        }
    }
}

/// Convert an MHTML text into a self-contained document tree using the
/// default DOM provider.
pub fn convert(text: &str, options: &ConvertOptions) -> Result<RcDom> {
    convert_with_provider(text, options, &Html5everProvider)
}

pub fn convert_with_provider(
    text: &str,
    options: &ConvertOptions,
    parse_dom: &dyn DomProvider,
) -> Result<RcDom> {
    let archive = match parse_stream(text, false, false)? {
        ParseOutcome::Archive(archive) => archive,
        ParseOutcome::HtmlOnly(_) => unreachable!("html_only is disabled for convert"),
    };

    convert_archive(&archive, options, parse_dom)
}

/// Convert an already-parsed archive. The caller keeps ownership of the
/// archive; the returned DOM is the only thing mutated.
pub fn convert_archive(
    archive: &MhtmlArchive,
    options: &ConvertOptions,
    parse_dom: &dyn DomProvider,
) -> Result<RcDom> {
    let root = archive.media.get(&archive.index).ok_or_else(|| {
        MhtmlError::InvalidArchive(format!(
            "index URL {} is not present in the media table",
            archive.index
        ))
    })?;
    if root.media_type != "text/html" {
        return Err(MhtmlError::InvalidArchive(format!(
            "index resource is {}, expected text/html",
            root.media_type
        )));
    }

    let html = decode_resource_text(root)?;
    let dom = parse_dom.parse_dom(&preprocess_html(&html));
    walk(archive, options, &dom, parse_dom, 0);

    Ok(dom)
}
