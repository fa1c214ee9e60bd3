use cssparser::{serialize_identifier, serialize_string, ParseError, Parser, ParserInput, Token};
use tracing::warn;

use crate::parsers::mhtml::MhtmlArchive;
use crate::utils::encoding::{decode_resource_text, to_data_url};
use crate::utils::url::{create_data_url, resolve_reference};

// CSS 重写：将 url()/@import 引用替换为资源表中的数据 URL

/// Nested stylesheet recursion bound. A reference cycle between two
/// captured CSS files would otherwise recurse without end.
const MAX_CSS_DEPTH: usize = 32;

/// Rewrite a CSS text against the archive: every `url(...)` or `@import`
/// payload that resolves to a captured resource becomes a data URL; nested
/// stylesheets recurse with their own URL as base. References that do not
/// resolve re-serialize as written.
pub fn embed_css(archive: &MhtmlArchive, base_url: &str, css: &str) -> String {
    embed_css_at_depth(archive, base_url, css, 0)
}

fn embed_css_at_depth(archive: &MhtmlArchive, base_url: &str, css: &str, depth: usize) -> String {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);

    process_css(archive, base_url, depth, &mut parser, "", "").unwrap()
}

pub fn format_ident(ident: &str) -> String {
    let mut res: String = "".to_string();
    let _ = serialize_identifier(ident, &mut res);
    res = res.trim_end().to_string();
    res
}

pub fn format_quoted_string(string: &str) -> String {
    let mut res: String = "".to_string();
    let _ = serialize_string(string, &mut res);
    res
}

/// Embed one resolved reference, or `None` to keep the original text.
/// Per-reference failures are logged and skipped; they never abort the
/// surrounding rewrite.
fn embed_reference(
    archive: &MhtmlArchive,
    base_url: &str,
    depth: usize,
    reference: &str,
) -> Option<String> {
    let key = resolve_reference(&archive.media, base_url, reference)?;
    let resource = archive.media.get(&key)?;

    if resource.media_type == "text/css" {
        if depth + 1 >= MAX_CSS_DEPTH {
            warn!(url = %key, "stylesheet nesting exceeds depth bound; keeping reference");
            return None;
        }
        // Realize the @import chain: the nested sheet is rewritten against
        // its own URL before being embedded
        match decode_resource_text(resource) {
            Ok(css) => {
                let embedded = embed_css_at_depth(archive, &key, &css, depth + 1);
                Some(
                    create_data_url(&resource.media_type, &resource.charset, embedded.as_bytes())
                        .to_string(),
                )
            }
            Err(e) => {
                warn!(url = %key, error = %e, "failed to decode nested stylesheet; keeping reference");
                None
            }
        }
    } else {
        match to_data_url(resource) {
            Ok(data_url) => Some(data_url),
            Err(e) => {
                warn!(url = %key, error = %e, "failed to embed asset; keeping reference");
                None
            }
        }
    }
}

/// Token-level rewriting pass. The scan is a single forward walk; inserted
/// data URLs go straight to the output and are never re-scanned.
pub fn process_css(
    archive: &MhtmlArchive,
    base_url: &str,
    depth: usize,
    parser: &mut Parser,
    rule_name: &str,
    func_name: &str,
) -> Result<String, ParseError<'static, String>> {
    let mut result = String::new();
    let mut current_rule: String = rule_name.to_string();

    loop {
        let token_offset = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        let token_result = match &token {
            Token::Comment(_) => parser.slice_from(token_offset).to_string(),
            Token::Semicolon => ";".to_string(),
            Token::Colon => ":".to_string(),
            Token::Comma => ",".to_string(),
            Token::CloseParenthesis => ")".to_string(),
            Token::CloseSquareBracket => "]".to_string(),
            Token::CloseCurlyBracket => "}".to_string(),
            Token::IncludeMatch => "~=".to_string(),
            Token::DashMatch => "|=".to_string(),
            Token::PrefixMatch => "^=".to_string(),
            Token::SuffixMatch => "$=".to_string(),
            Token::SubstringMatch => "*=".to_string(),
            Token::CDO => "<!--".to_string(),
            Token::CDC => "-->".to_string(),
            Token::WhiteSpace(value) => value.to_string(),
            Token::Ident(value) => {
                current_rule.clear();
                format_ident(value)
            }
            Token::AtKeyword(value) => {
                current_rule = value.to_string();
                format!("@{}", value)
            }
            Token::Hash(value) => format!("#{}", value),
            Token::IDHash(value) => {
                current_rule.clear();
                format!("#{}", format_ident(value))
            }
            Token::QuotedString(value) => {
                if current_rule == "import" {
                    // Reset current at-rule value
                    current_rule.clear();

                    // Skip empty import values
                    if value.is_empty() {
                        "''".to_string()
                    } else {
                        match embed_reference(archive, base_url, depth, value) {
                            Some(data_url) => format_quoted_string(&data_url),
                            None => format_quoted_string(value),
                        }
                    }
                } else if func_name == "url" {
                    // Skip empty url()'s
                    if value.is_empty() {
                        String::new()
                    } else {
                        match embed_reference(archive, base_url, depth, value) {
                            Some(data_url) => format_quoted_string(&data_url),
                            None => format_quoted_string(value),
                        }
                    }
                } else {
                    format_quoted_string(value)
                }
            }
            Token::Number {
                has_sign, value, ..
            } => {
                let mut result = String::new();
                if *has_sign && *value >= 0.0 {
                    result.push('+');
                }
                result.push_str(&value.to_string());
                result
            }
            Token::Percentage {
                has_sign,
                unit_value,
                ..
            } => {
                let mut result = String::new();
                if *has_sign && *unit_value >= 0.0 {
                    result.push('+');
                }
                result.push_str(&(unit_value * 100.0).to_string());
                result.push('%');
                result
            }
            Token::Dimension {
                has_sign,
                value,
                unit,
                ..
            } => {
                let mut result = String::new();
                if *has_sign && *value >= 0.0 {
                    result.push('+');
                }
                result.push_str(&value.to_string());
                result.push_str(unit);
                result
            }
            Token::UnquotedUrl(value) => {
                if current_rule == "import" {
                    current_rule.clear();
                }

                // Skip empty url()'s
                if value.is_empty() {
                    "url()".to_string()
                } else if value.starts_with('#') {
                    // Hash-only URLs point into the document itself
                    format!("url({})", value)
                } else {
                    match embed_reference(archive, base_url, depth, value) {
                        Some(data_url) => format!("url({})", format_quoted_string(&data_url)),
                        None => format!("url({})", value),
                    }
                }
            }
            Token::Delim(value) => value.to_string(),
            Token::ParenthesisBlock | Token::SquareBracketBlock | Token::CurlyBracketBlock => {
                let (open_char, close_char) = match &token {
                    Token::ParenthesisBlock => ('(', ')'),
                    Token::SquareBracketBlock => ('[', ']'),
                    Token::CurlyBracketBlock => ('{', '}'),
                    _ => ('(', ')'), // fallback
                };

                let rule = current_rule.clone();
                let mut result = String::new();
                result.push(open_char);

                let block_css = parser
                    .parse_nested_block(|parser| {
                        process_css(archive, base_url, depth, parser, &rule, func_name)
                    })
                    .unwrap();
                result.push_str(&block_css);

                result.push(close_char);
                result
            }
            Token::Function(name) => {
                let function_name = name.to_string();
                let rule = current_rule.clone();
                let mut result = String::new();
                result.push_str(&function_name);
                result.push('(');

                let block_css = parser
                    .parse_nested_block(|parser| {
                        process_css(archive, base_url, depth, parser, &rule, &function_name)
                    })
                    .unwrap();
                result.push_str(&block_css);

                result.push(')');
                result
            }
            Token::BadUrl(_) | Token::BadString(_) => String::new(),
        };

        result.push_str(&token_result);
    }

    // Ensure empty CSS is really empty
    if !result.is_empty() && result.trim().is_empty() {
        result = result.trim().to_string();
    }

    Ok(result)
}
