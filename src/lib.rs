//! # mhtml2html
//!
//! 把 MHTML 页面存档转换为单一自包含 HTML 文档的工具库：
//! 所有外部引用（样式表、图片、iframe）都被替换为归档内捕获字节的
//! 数据 URL，输出无需任何网络请求即可渲染。
//!
//! ## 模块组织
//!
//! - `core` - 公共 API、错误类型和选项
//! - `parsers` - MHTML 状态机解析器、CSS 与 HTML 重写器
//! - `utils` - URL 解析和传输编码工具
//!
//! ## Example
//!
//! ```no_run
//! use mhtml2html::{convert, ConvertOptions};
//!
//! let mhtml = std::fs::read_to_string("page.mhtml").unwrap();
//! let dom = convert(&mhtml, &ConvertOptions::default()).unwrap();
//! let html = mhtml2html::parsers::html::dom::serialize_document(&dom);
//! ```

pub mod core;
pub mod parsers;
pub mod utils;

// Re-export commonly used items for convenience
pub use crate::core::{
    convert, convert_archive, convert_with_provider, parse, parse_with_provider, ConvertOptions,
    DomProvider, Html5everProvider, MhtmlError, ParseOptions, ParsedMhtml, Result,
};
pub use crate::parsers::mhtml::{MhtmlArchive, Resource, ResourceMap, TransferEncoding};
