pub mod event;
pub mod result;
pub mod store;

pub use event::*;
pub use result::*;
pub use store::*;
