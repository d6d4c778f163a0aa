//! Semantic compression of conversation content

pub mod compressor;
pub mod protected;

pub use compressor::{
    CompressedContent, CompressionLevel, CompressorConfig, SemanticCompressor,
};
pub use protected::{extract_protected_spans, ProtectedKind, ProtectedSpan};
