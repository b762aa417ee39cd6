//! Backlog file reader.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("Backlog file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read backlog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Parse backlog text: one source reference per line, blank lines and lines
/// starting with `#` ignored, duplicates dropped in first-seen order.
pub fn parse_backlog(contents: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// Read and parse the backlog file.
pub async fn load_backlog(path: &Path) -> Result<Vec<String>, BacklogError> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BacklogError::NotFound(path.to_path_buf())
        } else {
            BacklogError::Read {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    let urls = parse_backlog(&contents);
    tracing::info!("Loaded {} URLs from {}", urls.len(), path.display());
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let text = "# queue\n\nhttps://a.example/x\n   \n  https://b.example/y  \n#https://c.example/z\n";
        assert_eq!(
            parse_backlog(text),
            vec!["https://a.example/x", "https://b.example/y"]
        );
    }

    #[test]
    fn test_parse_deduplicates_in_order() {
        let text = "https://b.example/1\nhttps://a.example/2\nhttps://b.example/1\n";
        assert_eq!(
            parse_backlog(text),
            vec!["https://b.example/1", "https://a.example/2"]
        );
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_backlog(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, BacklogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://a.example/x\n").unwrap();
        assert_eq!(load_backlog(&path).await.unwrap(), vec!["https://a.example/x"]);
    }
}
