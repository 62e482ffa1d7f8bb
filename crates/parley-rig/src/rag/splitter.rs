//! Text splitting for chunk creation.

use text_splitter::{ChunkConfig, TextSplitter};

use super::Document;
use crate::{Error, Result};

/// Splits documents into overlapping character chunks.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    chunk_size: usize,
    overlap: usize,
}

impl Splitter {
    /// Creates a splitter. The overlap must be smaller than the chunk size.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        ChunkConfig::new(chunk_size)
            .with_overlap(overlap)
            .map_err(|e| Error::config(format!("invalid chunk configuration: {e}")))?;
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Returns the same splitter with another chunk size.
    ///
    /// The overlap shrinks when it would not fit the new size.
    pub fn with_chunk_size(self, chunk_size: usize) -> Result<Self> {
        let overlap = self.overlap.min(chunk_size.saturating_sub(1));
        Self::new(chunk_size, overlap)
    }

    /// Splits text into chunks.
    pub fn split_text(&self, text: &str) -> Result<Vec<String>> {
        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.overlap)
            .map_err(|e| Error::config(format!("invalid chunk configuration: {e}")))?;
        let splitter = TextSplitter::new(config);
        Ok(splitter.chunks(text).map(str::to_owned).collect())
    }

    /// Splits documents, carrying each document's metadata onto its chunks.
    pub fn split_documents(&self, documents: &[Document]) -> Result<Vec<Document>> {
        let mut chunks = Vec::new();
        for document in documents {
            for text in self.split_text(&document.content)? {
                chunks.push(Document::new(text).with_metadata_map(&document.metadata));
            }
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        assert!(Splitter::new(100, 100).is_err());
        assert!(Splitter::new(100, 20).is_ok());
    }

    #[test]
    fn chunks_respect_size_and_keep_metadata() {
        let splitter = Splitter::new(50, 10).unwrap();
        let text = "Rust is a systems language. ".repeat(20);
        let document = Document::new(text).with_metadata("filename", "rust.txt");

        let chunks = splitter.split_documents(&[document]).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 50);
            assert_eq!(chunk.filename(), Some("rust.txt"));
        }
    }

    #[test]
    fn shrinks_overlap_for_small_chunks() {
        let splitter = Splitter::new(1000, 200).unwrap().with_chunk_size(100).unwrap();
        assert!(splitter.split_text("short text").is_ok());
    }
}
