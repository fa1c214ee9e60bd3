use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::format_tendril;
use html5ever::tendril::TendrilSink;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

/// 按声明的字符集把 HTML 字节解析为 DOM；未知字符集退回 UTF-8 宽松解码。
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let text = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut text.as_bytes())
        .unwrap()
}

/// Every element named `name` at or below `root`, in document order.
pub fn descendants_named(root: &Handle, name: &str) -> Vec<Handle> {
    let mut found: Vec<Handle> = Vec::new();
    let mut stack: Vec<Handle> = vec![root.clone()];

    while let Some(node) = stack.pop() {
        if get_node_name(&node) == Some(name) {
            found.push(node.clone());
        }
        // Reverse push keeps the pop order equal to document order
        for child in node.children.borrow().iter().rev() {
            stack.push(child.clone());
        }
    }

    found
}

/// 元素的标签名；非元素节点返回 None。
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    if let NodeData::Element { ref name, .. } = node.data {
        Some(name.local.as_ref())
    } else {
        None
    }
}

/// 读取元素属性。
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    let NodeData::Element { ref attrs, .. } = node.data else {
        return None;
    };

    attrs
        .borrow()
        .iter()
        .find(|attr| &*attr.name.local == attr_name)
        .map(|attr| attr.value.to_string())
}

/// 写入元素属性；`None` 表示删除该属性。
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    let NodeData::Element { ref attrs, .. } = node.data else {
        return;
    };
    let mut attrs = attrs.borrow_mut();

    match attr_value {
        Some(value) => {
            if let Some(attr) = attrs.iter_mut().find(|attr| &*attr.name.local == attr_name) {
                attr.value.clear();
                attr.value.push_slice(&value);
            } else {
                attrs.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", value),
                });
            }
        }
        None => attrs.retain(|attr| &*attr.name.local != attr_name),
    }
}

/// 获取父节点（保留弱引用）。
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// Create a bare text node.
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(format_tendril!("{}", text)),
    })
}

/// Create a bare element node with no parent or children.
pub fn create_element_node(name: QualName, attrs: Vec<Attribute>) -> Handle {
    Node::new(NodeData::Element {
        name,
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// Concatenated text content of a node's direct text children.
pub fn node_text(node: &Handle) -> String {
    let mut text = String::new();
    for child in node.children.borrow().iter() {
        if let NodeData::Text { ref contents } = child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

/// Swap `old_child` for `new_child` in place, keeping sibling order.
pub fn replace_child(parent: &Handle, old_child: &Handle, new_child: Handle) {
    let mut children = parent.children.borrow_mut();
    if let Some(position) = children.iter().position(|child| Rc::ptr_eq(child, old_child)) {
        new_child.parent.set(Some(Rc::downgrade(parent)));
        children[position] = new_child;
    }
}

/// 移除子节点。
pub fn remove_child(parent: &Handle, child: &Handle) {
    let mut children = parent.children.borrow_mut();
    if let Some(position) = children.iter().position(|c| Rc::ptr_eq(c, child)) {
        children.remove(position);
    }
}

/// 将 DOM 序列化为 HTML 字符串。
pub fn serialize_document(dom: &RcDom) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = dom.document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .expect("unable to serialize DOM into buffer");

    String::from_utf8_lossy(&buf).to_string()
}
