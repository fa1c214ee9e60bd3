//! # 工具模块
//!
//! - `url` - 引用清理、资源表解析策略、数据 URL 构造
//! - `encoding` - 传输编码解码器（base64 / quoted-printable）

pub mod encoding;
pub mod url;

// Re-export commonly used items for convenience
pub use encoding::{decode_base64, decode_quoted_printable, decode_resource, to_data_url};
pub use url::{clean_reference, create_data_url, is_url_and_has_protocol, resolve_reference, Url};
