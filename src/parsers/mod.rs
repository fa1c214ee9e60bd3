//! # 解析器模块
//!
//! 资源解析与重写：
//!
//! - `mhtml` - multipart/related 字节流的状态机解析器
//! - `css` - url()/@import 引用的数据 URL 重写
//! - `html` - DOM 操作、遍历和声明式 Shadow DOM 处理

pub mod css;
pub mod html;
pub mod mhtml;

// Re-export commonly used items for convenience
pub use css::embed_css;
pub use mhtml::{parse_content_type, MhtmlArchive, Resource, ResourceMap, TransferEncoding};
