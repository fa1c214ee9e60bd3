//! DOM 重写器
//!
//! 对 DOM 提供者产出的文档树做广度优先遍历，把每个可解析的外部引用
//! 替换为资源表中的数据 URL：样式表内联、图片转 data URI、可选的
//! iframe 递归转换。遍历会修改传入的 DOM 树。

use std::collections::VecDeque;
use std::rc::Rc;

use html5ever::interface::{Attribute, QualName};
use html5ever::tendril::format_tendril;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use percent_encoding::utf8_percent_encode;
use regex::Regex;
use tracing::warn;

use crate::core::{ConvertOptions, DomProvider};
use crate::parsers::css::embed_css;
use crate::parsers::mhtml::MhtmlArchive;
use crate::utils::encoding::{decode_resource_text, to_data_url};
use crate::utils::url::{resolve_reference, COMPONENT_ENCODE_SET};

use super::dom::{
    create_element_node, create_text_node, get_node_attr, get_parent_node, node_text,
    replace_child, serialize_document, set_node_attr,
};
use super::shadow::{find_shadow_template, flatten_shadow_template};

/// Iframe recursion bound; a capture whose frame references itself would
/// otherwise convert without end.
const MAX_FRAME_DEPTH: usize = 8;

/// A LINK is a candidate for inlining only when its `rel` names a plain
/// stylesheet; `alternate stylesheet` and every other rel flavor (icons,
/// preloads, ...) pass through untouched.
fn rel_is_plain_stylesheet(link_attr_rel_value: &str) -> bool {
    let mut is_stylesheet = false;

    for token in link_attr_rel_value.split_whitespace() {
        if token.eq_ignore_ascii_case("alternate") {
            return false;
        }
        if token.eq_ignore_ascii_case("stylesheet") {
            is_stylesheet = true;
        }
    }

    is_stylesheet
}

/// Rename declarative-shadow attributes before the DOM provider parses the
/// text. Some providers implement partial shadow-DOM semantics that consume
/// the host's light-DOM children at parse time; renaming defers all shadow
/// handling to the walker.
pub fn preprocess_html(html: &str) -> String {
    let shadow_attr_re = Regex::new(r#"(?i)(\s)(shadowrootmode|shadowmode)\s*="#).unwrap();
    shadow_attr_re.replace_all(html, "${1}data-${2}=").to_string()
}

/// DOM 遍历和重写的入口函数
///
/// Breadth-first over the element tree; children are enqueued after their
/// element has been rewritten, so adopted shadow content and freshly
/// inserted nodes are themselves visited.
pub fn walk(
    archive: &MhtmlArchive,
    options: &ConvertOptions,
    dom: &RcDom,
    parse_dom: &dyn DomProvider,
    frame_depth: usize,
) {
    let mut queue: VecDeque<Handle> = VecDeque::new();
    queue.push_back(dom.document.clone());

    while let Some(node) = queue.pop_front() {
        if let NodeData::Element { ref name, .. } = node.data {
            let node_name = name.local.to_string();
            process_element(archive, options, dom, parse_dom, &node, &node_name, frame_depth);
        }

        for child_node in node.children.borrow().iter() {
            queue.push_back(child_node.clone());
        }
    }
}

fn process_element(
    archive: &MhtmlArchive,
    options: &ConvertOptions,
    dom: &RcDom,
    parse_dom: &dyn DomProvider,
    node: &Handle,
    node_name: &str,
    frame_depth: usize,
) {
    // Captured subresources no longer match their original hashes
    if get_node_attr(node, "integrity").is_some() {
        set_node_attr(node, "integrity", None);
    }

    if let Some(template) = find_shadow_template(node) {
        flatten_shadow_template(node, &template);
    }

    match node_name {
        "head" => {
            // data: documents render in an iframe-like context; BASE makes
            // links navigate the outer frame instead
            let base_node = create_element_node(
                QualName::new(None, ns!(), LocalName::from("base")),
                vec![Attribute {
                    name: QualName::new(None, ns!(), LocalName::from("target")),
                    value: format_tendril!("_parent"),
                }],
            );
            base_node.parent.set(Some(Rc::downgrade(node)));

            // BASE must come first so it applies to everything after it
            node.children.borrow_mut().reverse();
            node.children.borrow_mut().push(base_node);
            node.children.borrow_mut().reverse();
        }
        "link" => {
            if rel_is_plain_stylesheet(&get_node_attr(node, "rel").unwrap_or_default()) {
                if let Some(link_attr_href_value) = get_node_attr(node, "href") {
                    embed_linked_stylesheet(archive, dom, node, &link_attr_href_value);
                }
            }
        }
        "style" => {
            let css = node_text(node);
            let embedded = embed_css(archive, &archive.index, &css);
            replace_with_style(dom, node, &embedded);
        }
        "img" => {
            if let Some(img_attr_src_value) = get_node_attr(node, "src") {
                embed_image(archive, node, &img_attr_src_value);
            }
        }
        "iframe" => {
            if options.convert_iframes {
                if let Some(frame_attr_src_value) = get_node_attr(node, "src") {
                    embed_frame(
                        archive,
                        options,
                        parse_dom,
                        node,
                        &frame_attr_src_value,
                        frame_depth,
                    );
                }
            }
        }
        _ => {}
    }

    // Embed URLs found within the style attribute of this node. Raw
    // attribute read/write keeps CSS custom properties intact, which CSSOM
    // round trips drop.
    if let Some(node_attr_style_value) = get_node_attr(node, "style") {
        let embedded_style = embed_css(archive, &archive.index, &node_attr_style_value);
        set_node_attr(node, "style", Some(embedded_style));
    }
}

/// Replace a LINK stylesheet with an inline STYLE carrying the rewritten
/// sheet. References that do not resolve to captured CSS stay as they are.
fn embed_linked_stylesheet(archive: &MhtmlArchive, dom: &RcDom, node: &Handle, href: &str) {
    let Some(key) = resolve_reference(&archive.media, &archive.index, href) else {
        return;
    };
    let Some(resource) = archive.media.get(&key) else {
        return;
    };
    if resource.media_type != "text/css" {
        return;
    }

    match decode_resource_text(resource) {
        Ok(stylesheet) => {
            // The sheet's own URL is the base for its relative references
            let embedded = embed_css(archive, &key, &stylesheet);
            replace_with_style(dom, node, &embedded);
        }
        Err(e) => {
            warn!(url = %key, error = %e, "failed to decode stylesheet; keeping LINK");
        }
    }
}

/// Swap `node` for a fresh STYLE element whose text is `css`.
fn replace_with_style(dom: &RcDom, node: &Handle, css: &str) {
    let style_node = create_element_node(
        QualName::new(None, ns!(), LocalName::from("style")),
        vec![],
    );

    let text_node = create_text_node(css);
    text_node.parent.set(Some(Rc::downgrade(&style_node)));
    style_node.children.borrow_mut().push(text_node);

    if let Some(parent) = get_parent_node(node) {
        replace_child(&parent, node, style_node);
    }
}

fn embed_image(archive: &MhtmlArchive, node: &Handle, src: &str) {
    let Some(key) = resolve_reference(&archive.media, &archive.index, src) else {
        return;
    };
    let Some(resource) = archive.media.get(&key) else {
        return;
    };
    if !resource.media_type.starts_with("image") {
        return;
    }

    match to_data_url(resource) {
        Ok(data_url) => set_node_attr(node, "src", Some(data_url)),
        Err(e) => {
            warn!(url = %key, error = %e, "failed to embed image; keeping reference");
        }
    }
}

/// Convert a `cid:` IFRAME into an inline `data:text/html` document by
/// recursively converting the referenced frame against a synthesized
/// archive that shares this archive's tables.
fn embed_frame(
    archive: &MhtmlArchive,
    options: &ConvertOptions,
    parse_dom: &dyn DomProvider,
    node: &Handle,
    src: &str,
    frame_depth: usize,
) {
    let Some(id) = src.strip_prefix("cid:") else {
        return;
    };

    let content_id = format!("<{id}>");
    let Some(frame) = archive.frames.get(&content_id) else {
        warn!(cid = %content_id, "iframe references an unknown frame; keeping cid: URL");
        return;
    };
    if frame.media_type != "text/html" {
        return;
    }
    if frame_depth + 1 >= MAX_FRAME_DEPTH {
        warn!(cid = %content_id, "frame nesting exceeds depth bound; keeping cid: URL");
        return;
    }

    let frame_html = match decode_resource_text(frame) {
        Ok(html) => html,
        Err(e) => {
            warn!(cid = %content_id, error = %e, "failed to decode frame body; keeping cid: URL");
            return;
        }
    };

    // Shallow copy: new index, shared media and frame tables
    let mut frame_archive = MhtmlArchive {
        index: src.to_string(),
        media: archive.media.clone(),
        frames: archive.frames.clone(),
    };
    frame_archive.media.insert(src.to_string(), frame.clone());

    let frame_dom = parse_dom.parse_dom(&preprocess_html(&frame_html));
    walk(&frame_archive, options, &frame_dom, parse_dom, frame_depth + 1);

    let converted = serialize_document(&frame_dom);
    set_node_attr(
        node,
        "src",
        Some(format!(
            "data:text/html;charset=utf-8,{}",
            utf8_percent_encode(&converted, COMPONENT_ENCODE_SET)
        )),
    );
}
