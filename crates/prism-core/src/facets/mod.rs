//! 内置切面目录。
//!
//! 这里只收录结构性、与具体编码无关的切面；各协议的解码切面由外部插件 crate 自行定义，
//! 只需实现 [`crate::Facet`]。

mod http;
mod marker;
mod structural;
mod transport;
mod value;

pub use http::{HttpHeaderFacet, HttpMessageFacet, HttpRequestFacet, HttpResponseFacet, UriFacet};
pub use marker::{NonTransmissionFacet, NoteFacet, NoteSeverity};
pub use structural::{ListFacet, MapFacet, NestedFacet, RootFacet};
pub use transport::{
    Endpoint, InvalidEndpoint, MessagePairFacet, MessageTimingFacet, TcpIpMessageFacet,
};
pub use value::{Value, ValueFacet};
