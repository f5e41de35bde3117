mod exefs;
mod exheader;
mod header;
mod ncsd;

pub use exefs::*;
pub use exheader::*;
pub use header::*;
pub use ncsd::*;
