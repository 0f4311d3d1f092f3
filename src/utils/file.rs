//! File utilities for ingestion.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Calculate SHA-256 checksum of content.
pub fn calculate_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(hash)
}

/// Read a file as raw bytes, refusing anything above `max_size`.
pub fn read_file_bytes(path: &Path, max_size: u64) -> std::io::Result<Vec<u8>> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    fs::read(path)
}

/// Check if extension indicates a plain-text document.
pub fn is_text_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "txt" | "text" | "md" | "markdown" | "rst" | "adoc" | "org" | "csv" | "log"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_calculate_checksum() {
        let checksum = calculate_checksum("hello world");
        assert_eq!(checksum.len(), 64); // SHA-256 produces 64 hex chars
        assert_eq!(checksum, calculate_checksum("hello world"));
        assert_ne!(checksum, calculate_checksum("hello world!"));
    }

    #[test]
    fn test_is_text_extension() {
        assert!(is_text_extension("txt"));
        assert!(is_text_extension("MD"));
        assert!(!is_text_extension("pdf"));
        assert!(!is_text_extension("png"));
    }

    #[test]
    fn test_read_file_bytes_respects_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        assert_eq!(read_file_bytes(file.path(), 10).unwrap(), b"0123456789");
        let err = read_file_bytes(file.path(), 5).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
