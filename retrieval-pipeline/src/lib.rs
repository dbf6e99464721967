pub mod context;
pub mod embedding;
pub mod pipeline;
pub mod scoring;
pub mod selection;
pub mod store;

pub use pipeline::SearchMethod;
pub use selection::SelectedChunk;
pub use store::{ChunkStore, SearchFilter};
