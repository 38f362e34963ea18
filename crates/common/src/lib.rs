pub mod domain;
pub mod memory;
pub mod telemetry;

pub use domain::*;
pub use memory::MemoryDocumentStore;
