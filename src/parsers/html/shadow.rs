//! 声明式 Shadow DOM 展平
//!
//! 预处理阶段把 `shadowrootmode`/`shadowmode` 重命名为 `data-` 前缀，
//! 使 DOM 提供者不会吞掉宿主的 light-DOM 子节点；此处负责把改名后的
//! 模板内容展平为普通子节点。

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use super::dom::{get_node_attr, get_node_name, remove_child, set_node_attr};

/// Find a direct child `<template>` carrying a renamed declarative-shadow
/// attribute.
pub fn find_shadow_template(node: &Handle) -> Option<Handle> {
    node.children
        .borrow()
        .iter()
        .find(|child| {
            get_node_name(child) == Some("template")
                && (get_node_attr(child, "data-shadowrootmode").is_some()
                    || get_node_attr(child, "data-shadowmode").is_some())
        })
        .cloned()
}

/// Flatten one shadow template into its host.
///
/// Slot-only templates, and templates on hosts that already carry rendered
/// light-DOM children, are dropped so the light DOM stays in place.
/// Otherwise the template's content becomes regular children of the host.
/// Either way the template is removed and a `loaded` attribute on the host
/// is stripped, so CSS rules gated on `:not([loaded])` apply.
pub fn flatten_shadow_template(host: &Handle, template: &Handle) {
    let contents: Option<Handle> = match template.data {
        NodeData::Element {
            ref template_contents,
            ..
        } => template_contents.borrow().clone(),
        _ => None,
    };

    let slots_only = contents.as_ref().map_or(true, template_is_slots_only);
    let host_has_light_children = host
        .children
        .borrow()
        .iter()
        .any(|child| !Rc::ptr_eq(child, template) && is_rendered_node(child));

    if !slots_only && !host_has_light_children {
        if let Some(contents) = contents {
            let adopted: Vec<Handle> = contents
                .children
                .borrow()
                .iter()
                .filter(|child| !matches!(child.data, NodeData::Comment { .. }))
                .cloned()
                .collect();

            let mut children = host.children.borrow_mut();
            for child in adopted {
                child.parent.set(Some(Rc::downgrade(host)));
                children.push(child);
            }
        }
    }

    remove_child(host, template);
    set_node_attr(host, "loaded", None);
}

/// True when the template body holds nothing but `<slot>` placeholders
/// (comments and whitespace ignored).
fn template_is_slots_only(contents: &Handle) -> bool {
    contents.children.borrow().iter().all(|child| match child.data {
        NodeData::Element { ref name, .. } => &*name.local == "slot",
        NodeData::Text { ref contents } => contents.borrow().trim().is_empty(),
        _ => true,
    })
}

/// A host child that would actually render: an element or non-blank text.
fn is_rendered_node(node: &Handle) -> bool {
    match node.data {
        NodeData::Element { .. } => true,
        NodeData::Text { ref contents } => !contents.borrow().trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{descendants_named, html_to_dom};
    use crate::parsers::html::walker::preprocess_html;

    fn host_from(html: &str) -> Handle {
        let dom = html_to_dom(preprocess_html(html).as_bytes(), "utf-8");
        descendants_named(&dom.document, "div")
            .first()
            .cloned()
            .unwrap()
    }

    fn has_child(host: &Handle, name: &str) -> bool {
        host.children
            .borrow()
            .iter()
            .any(|child| get_node_name(child) == Some(name))
    }

    #[test]
    fn test_populated_template_is_adopted() {
        let host = host_from(
            "<html><body><div loaded><template shadowrootmode=\"open\"><span>inner</span></template></div></body></html>",
        );
        let template = find_shadow_template(&host).unwrap();
        flatten_shadow_template(&host, &template);

        assert!(!has_child(&host, "template"));
        assert!(has_child(&host, "span"));
        assert_eq!(get_node_attr(&host, "loaded"), None);
    }

    #[test]
    fn test_slot_only_template_keeps_light_dom() {
        let host = host_from(
            "<html><body><div><template shadowrootmode=\"open\"><slot></slot></template><p>light</p></div></body></html>",
        );
        let template = find_shadow_template(&host).unwrap();
        flatten_shadow_template(&host, &template);

        assert!(!has_child(&host, "template"));
        assert!(has_child(&host, "p"));
        assert!(!has_child(&host, "slot"));
    }

    #[test]
    fn test_host_with_light_children_drops_template() {
        let host = host_from(
            "<html><body><div><template shadowmode=\"closed\"><span>shadow</span></template><p>light</p></div></body></html>",
        );
        let template = find_shadow_template(&host).unwrap();
        flatten_shadow_template(&host, &template);

        assert!(!has_child(&host, "template"));
        assert!(!has_child(&host, "span"));
        assert!(has_child(&host, "p"));
    }
}
