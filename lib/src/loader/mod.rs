mod boot;
mod file_type;

pub use boot::*;
pub use file_type::*;
