pub mod file_tailer;
pub mod parser;

pub use file_tailer::{Chunk, LogTailer, TailError};
pub use parser::EventExtractor;
