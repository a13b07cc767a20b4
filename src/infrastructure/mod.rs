//! 基础设施层：持有浏览器页面和 HTTP 客户端这类稀缺资源

pub mod http_client;
pub mod js_executor;

pub use http_client::{FetchedPage, HttpSession};
pub use js_executor::JsExecutor;
