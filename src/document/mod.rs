pub mod chunker;
pub mod extractors;

pub use chunker::{chunk_rows, TextChunk, TextChunker};
