mod container;
mod overrides;
/// Raw on-disk structs.
pub mod raw;
mod romfs;

pub use container::*;
pub use overrides::*;
pub use romfs::*;
