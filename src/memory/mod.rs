// Long-lived agent memory: vector retrieval, per-sprint layers, meeting
// minutes and context compression

pub mod compressor;
pub mod embedding;
pub mod meetings;
pub mod rag;
pub mod sprint;
pub mod vector_store;

pub use compressor::{
    CompressionInfo, CompressionLevel, CompressionStats, CompressionStrategy, ContextCompressor,
};
pub use embedding::{cosine_similarity, EmbeddingProvider, HashEmbedding};
pub use meetings::{ActionItem, Attendance, MeetingMinutes, MeetingMinutesManager, MeetingType, Participant};
pub use rag::{IndexType, RagError, RagRetriever, RetrievalResult, SimilarityQuery, ALL_PROJECTS};
pub use sprint::{MemoryError, MemoryItem, MemoryLayer, SprintMemoryManager};
pub use vector_store::{InMemoryVectorStore, VectorMatch};
