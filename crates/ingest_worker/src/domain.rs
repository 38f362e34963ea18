pub mod alert_service;
pub mod buffer;
pub mod chunker;
pub mod counter_service;
pub mod monitor;
pub mod validator;
pub mod writer;

pub use alert_service::*;
pub use buffer::*;
pub use chunker::*;
pub use counter_service::*;
pub use monitor::*;
pub use validator::*;
pub use writer::*;
