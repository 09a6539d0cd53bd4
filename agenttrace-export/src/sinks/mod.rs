pub mod audit;
pub mod composite;
pub mod console;
pub mod file;
pub mod http;

pub use audit::AuditSink;
pub use composite::CompositeSink;
pub use console::ConsoleSink;
pub use file::FileSink;
pub use http::HttpSink;
