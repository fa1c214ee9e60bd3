//! 传输编码解码器
//!
//! MHTML 部件主体按 `Content-Transfer-Encoding` 惰性解码：
//! base64、quoted-printable，其余视为恒等编码。

use base64::{prelude::BASE64_STANDARD, Engine};
use encoding_rs::Encoding;
use percent_encoding::utf8_percent_encode;

use crate::core::{MhtmlError, Result};
use crate::parsers::mhtml::{Resource, TransferEncoding};
use crate::utils::url::{create_data_url, COMPONENT_ENCODE_SET};

/// Decode a base64 body.
///
/// Interior whitespace and line folds are tolerated (MHTML writers wrap
/// base64 at 76 columns); anything else outside the standard alphabet is an
/// error, as is missing padding.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| MhtmlError::DecodeFailure(format!("invalid base64 body: {e}")))
}

/// Decode a quoted-printable body: `=HH` hex escapes and soft line breaks
/// (`=` immediately before a line ending). Malformed escape sequences pass
/// through literally.
pub fn decode_quoted_printable(data: &str) -> Vec<u8> {
    let bytes = data.as_bytes();
    let mut result: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'=' {
            result.push(b);
            i += 1;
            continue;
        }

        // Soft line break: "=\r\n" or "=\n"
        if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }
        // "=" at end of input: soft break with the terminator already stripped
        if i + 1 >= bytes.len() {
            break;
        }

        match (hex_val(bytes[i + 1]), hex_val(bytes.get(i + 2).copied())) {
            (Some(hi), Some(lo)) => {
                result.push((hi << 4) | lo);
                i += 3;
            }
            _ => {
                result.push(b'=');
                i += 1;
            }
        }
    }

    result
}

fn hex_val(b: impl Into<Option<u8>>) -> Option<u8> {
    match b.into()? {
        c @ b'0'..=b'9' => Some(c - b'0'),
        c @ b'A'..=b'F' => Some(c - b'A' + 10),
        c @ b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Decode a resource body into raw bytes according to its declared
/// `Content-Transfer-Encoding`. 7bit/8bit/binary bodies pass through.
pub fn decode_resource(resource: &Resource) -> Result<Vec<u8>> {
    match resource.transfer_encoding {
        TransferEncoding::Base64 => decode_base64(&resource.data),
        TransferEncoding::QuotedPrintable => Ok(decode_quoted_printable(&resource.data)),
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            Ok(resource.data.as_bytes().to_vec())
        }
    }
}

/// Decode a resource into text, honoring its declared charset.
pub fn decode_resource_text(resource: &Resource) -> Result<String> {
    let data = decode_resource(resource)?;

    if let Some(encoding) = Encoding::for_label(resource.charset.as_bytes()) {
        let (string, _, _) = encoding.decode(&data);
        Ok(string.to_string())
    } else {
        Ok(String::from_utf8_lossy(&data).to_string())
    }
}

/// Embed a resource as a data URL.
///
/// Text kept in quoted-printable form stays text (`;utf8,` with the decoded
/// body percent-encoded); everything else is re-encoded as base64.
pub fn to_data_url(resource: &Resource) -> Result<String> {
    match resource.transfer_encoding {
        TransferEncoding::QuotedPrintable => {
            let text = decode_resource_text(resource)?;
            Ok(format!(
                "data:{};utf8,{}",
                resource.media_type,
                utf8_percent_encode(&text, COMPONENT_ENCODE_SET)
            ))
        }
        _ => {
            let data = decode_resource(resource)?;
            Ok(create_data_url(&resource.media_type, &resource.charset, &data).to_string())
        }
    }
}
