pub mod batch;
pub mod http;
pub mod line_protocol;

pub use batch::{BatchProcessor, BatchSink};
pub use http::{HttpConnection, HttpConnector};
