// 集成测试公共模块
//
// 提供 MHTML 归档构造和 DOM 检查辅助工具
#![allow(dead_code)]

use base64::{prelude::BASE64_STANDARD, Engine};
use markup5ever_rcdom::Handle;

use mhtml2html::parsers::html::dom::{descendants_named, get_node_attr, get_node_name};

pub const BOUNDARY: &str = "----MultipartBoundary--test";

/// Builds MHTML fixture texts part by part.
pub struct ArchiveBuilder {
    parts: Vec<(Vec<(String, String)>, String)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        ArchiveBuilder { parts: Vec::new() }
    }

    pub fn part(mut self, headers: &[(&str, &str)], body: &str) -> Self {
        self.parts.push((
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body.to_string(),
        ));
        self
    }

    pub fn html_part(self, location: &str, body: &str) -> Self {
        self.part(
            &[
                ("Content-Type", "text/html"),
                ("Content-Transfer-Encoding", "7bit"),
                ("Content-Location", location),
            ],
            body,
        )
    }

    pub fn css_part(self, location: &str, body: &str) -> Self {
        self.part(
            &[
                ("Content-Type", "text/css"),
                ("Content-Transfer-Encoding", "7bit"),
                ("Content-Location", location),
            ],
            body,
        )
    }

    pub fn css_part_base64(self, location: &str, body: &[u8]) -> Self {
        let encoded = BASE64_STANDARD.encode(body);
        self.part(
            &[
                ("Content-Type", "text/css"),
                ("Content-Transfer-Encoding", "base64"),
                ("Content-Location", location),
            ],
            &encoded,
        )
    }

    pub fn png_part(self, location: &str, bytes: &[u8]) -> Self {
        let encoded = BASE64_STANDARD.encode(bytes);
        self.part(
            &[
                ("Content-Type", "image/png"),
                ("Content-Transfer-Encoding", "base64"),
                ("Content-Location", location),
            ],
            &encoded,
        )
    }

    pub fn frame_part(self, content_id: &str, body: &str) -> Self {
        let content_id = format!("<{content_id}>");
        self.part(
            &[
                ("Content-Type", "text/html"),
                ("Content-Transfer-Encoding", "7bit"),
                ("Content-ID", content_id.as_str()),
            ],
            body,
        )
    }

    /// Assemble the archive with `\n` line endings.
    pub fn build(&self) -> String {
        self.build_with_line_ending("\n")
    }

    /// Assemble the archive with the given line terminator.
    pub fn build_with_line_ending(&self, eol: &str) -> String {
        let mut out = String::new();
        out.push_str("From: <Saved by test>");
        out.push_str(eol);
        out.push_str("MIME-Version: 1.0");
        out.push_str(eol);
        out.push_str(&format!(
            "Content-Type: multipart/related; type=\"text/html\"; boundary=\"{BOUNDARY}\""
        ));
        out.push_str(eol);
        out.push_str(eol);

        for (headers, body) in &self.parts {
            out.push_str(&format!("--{BOUNDARY}"));
            out.push_str(eol);
            for (name, value) in headers {
                out.push_str(&format!("{name}: {value}"));
                out.push_str(eol);
            }
            out.push_str(eol);
            for line in body.lines() {
                out.push_str(line);
                out.push_str(eol);
            }
            out.push_str(eol);
        }

        out.push_str(&format!("--{BOUNDARY}--"));
        out.push_str(eol);
        out
    }
}

/// All elements with the given tag name, in document order.
pub fn elements_named(document: &Handle, name: &str) -> Vec<Handle> {
    descendants_named(document, name)
}

/// Collect every `(tag, attr value)` pair for elements carrying `attr`.
pub fn attribute_values(document: &Handle, attr: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    collect_attribute_values(document, attr, &mut found);
    found
}

fn collect_attribute_values(node: &Handle, attr: &str, found: &mut Vec<(String, String)>) {
    if let Some(name) = get_node_name(node) {
        if let Some(value) = get_node_attr(node, attr) {
            found.push((name.to_string(), value));
        }
    }
    for child in node.children.borrow().iter() {
        collect_attribute_values(child, attr, found);
    }
}
