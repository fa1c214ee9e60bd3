//! HTML 解析和重写模块
//!
//! - `dom`: 基础 DOM 操作和序列化
//! - `shadow`: 声明式 Shadow DOM 展平
//! - `walker`: DOM 遍历和资源嵌入核心逻辑

pub mod dom;
pub mod shadow;
pub mod walker;

// 重新导出主要的公共 API
pub use dom::{
    descendants_named, get_node_attr, get_node_name, get_parent_node, html_to_dom,
    serialize_document, set_node_attr,
};
pub use walker::{preprocess_html, walk};
