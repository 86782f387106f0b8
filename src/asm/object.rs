//! Object-file format for assembled programs.
//!
//! An object file is a small JSON document holding the program image plus
//! the source lines it was assembled from (kept for debugging output).
//! The image is loaded into memory at address 0.

use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// An assembled program ready to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFile {
    /// The program image, one instruction or data word per cell.
    pub words: Vec<i32>,
    /// Originating source lines (for debugging).
    #[serde(default)]
    pub source: Vec<String>,
}

impl ObjectFile {
    /// Create an empty object file.
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            source: Vec::new(),
        }
    }

    /// Build an object file from a program image.
    pub fn from_words(words: Vec<i32>) -> Self {
        Self {
            words,
            source: Vec::new(),
        }
    }

    /// Append a word with its source line.
    pub fn push(&mut self, word: i32, source: &str) {
        self.words.push(word);
        self.source.push(source.to_string());
    }

    /// Number of words in the image.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for ObjectFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Load an object file from disk.
pub fn load_object<P: AsRef<Path>>(path: P) -> Result<ObjectFile, ObjectError> {
    let file = std::fs::File::open(path.as_ref()).map_err(|e| ObjectError::Io(e.to_string()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| ObjectError::Format(e.to_string()))
}

/// Save an object file to disk.
pub fn save_object<P: AsRef<Path>>(path: P, object: &ObjectFile) -> Result<(), ObjectError> {
    let file = std::fs::File::create(path.as_ref()).map_err(|e| ObjectError::Io(e.to_string()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, object).map_err(|e| ObjectError::Format(e.to_string()))
}

/// Errors that can occur loading or saving object files.
#[derive(Debug, Clone, Error)]
pub enum ObjectError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("object format error: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_len() {
        let mut object = ObjectFile::new();
        object.push(0, "HALT");
        object.push(42, "DAT 42");

        assert_eq!(object.len(), 2);
        assert_eq!(object.words, vec![0, 42]);
    }

    #[test]
    fn test_json_roundtrip() {
        let object = ObjectFile {
            words: vec![1, -2, 3],
            source: vec!["a".into(), "b".into(), "c".into()],
        };

        let json = serde_json::to_string(&object).unwrap();
        let back: ObjectFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, object);
    }

    #[test]
    fn test_source_lines_are_optional() {
        let back: ObjectFile = serde_json::from_str(r#"{"words":[7]}"#).unwrap();
        assert_eq!(back.words, vec![7]);
        assert!(back.source.is_empty());
    }
}
