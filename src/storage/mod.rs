pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileModelStore;
pub use memory::MemoryModelStore;
pub use traits::{BestModel, ModelStore};
