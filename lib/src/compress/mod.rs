/// Decompression of backwards LZ77, used by compressed code sections.
pub mod lz77;
