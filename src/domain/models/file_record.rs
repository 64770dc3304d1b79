use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Language;

/// Computes the 16-hex-character SHA-256 prefix used as a file content hash.
pub fn compute_content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// A crawled candidate file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub rel_path: String,
    pub language: Language,
    pub hash: String,
    pub size: u64,
    pub mtime_ms: u64,
}

/// Persisted per-file record in the file index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub relative_path: String,
    pub hash: String,
    pub mtime: u64,
    pub indexed_at: u64,
    pub chunk_count: u32,
}

impl FileRecord {
    pub fn from_crawl(info: &FileInfo, indexed_at: u64, chunk_count: u32) -> Self {
        Self {
            relative_path: info.rel_path.clone(),
            hash: info.hash.clone(),
            mtime: info.mtime_ms,
            indexed_at,
            chunk_count,
        }
    }

    /// A crawled file counts as unchanged when both mtime and hash match.
    pub fn matches(&self, info: &FileInfo) -> bool {
        self.hash == info.hash && self.mtime == info.mtime_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_prefix() {
        let hash = compute_content_hash(b"fn main() {}");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, compute_content_hash(b"fn main() {}"));
        assert_ne!(hash, compute_content_hash(b"fn main() { }"));
    }

    #[test]
    fn test_record_matches_crawl() {
        let info = FileInfo {
            path: PathBuf::from("/repo/a.rs"),
            rel_path: "a.rs".to_string(),
            language: Language::Rust,
            hash: "aabbccddeeff0011".to_string(),
            size: 12,
            mtime_ms: 1000,
        };
        let record = FileRecord::from_crawl(&info, 2000, 3);
        assert!(record.matches(&info));

        let touched = FileInfo {
            mtime_ms: 1001,
            ..info.clone()
        };
        assert!(!record.matches(&touched));

        let rewritten = FileInfo {
            hash: "1100ffeeddccbbaa".to_string(),
            ..info
        };
        assert!(!record.matches(&rewritten));
    }
}
