//! Uploaded URL lists and produced output files.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::error::ApiError;
use crate::ids::{FileId, JobId};

static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// A profile URL list uploaded by the user.
    Upload,
    /// Scraping results of a successful job.
    Output,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: FileId,
    pub kind: FileKind,
    pub filename: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub created_at: DateTime<Utc>,
}

/// Registry of every file the engine knows about.
pub struct FileRegistry {
    files: RwLock<HashMap<FileId, StoredFile>>,
    base_url: String,
}

impl FileRegistry {
    /// `base_url` prefixes download links, e.g. `https://api.linkedagent.com/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            files: RwLock::new(HashMap::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Stores an uploaded URL list and returns its id.
    pub fn upload(&self, filename: &str, bytes: &[u8]) -> Result<FileId, ApiError> {
        if filename.trim().is_empty() {
            return Err(ApiError::validation("filename must not be empty"));
        }
        let text = std::str::from_utf8(bytes).map_err(|e| {
            ApiError::validation(format!("'{}' is not valid UTF-8: {}", filename, e))
        })?;

        let urls = parse_url_list(text);
        if urls.is_empty() {
            return Err(ApiError::validation(format!(
                "'{}' contains no http(s) profile URLs",
                filename
            )));
        }

        let file = StoredFile {
            id: FileId::new(),
            kind: FileKind::Upload,
            filename: filename.to_string(),
            urls,
            job_id: None,
            created_at: Utc::now(),
        };
        let id = file.id;
        log::info!(
            "Stored upload {} ('{}', {} URLs)",
            id,
            file.filename,
            file.urls.len()
        );
        self.write_files().insert(id, file);
        Ok(id)
    }

    /// Number of URLs in an uploaded list.
    pub fn url_count(&self, id: &FileId) -> Result<u64, ApiError> {
        let files = self.read_files();
        match files.get(id) {
            Some(file) if file.kind == FileKind::Upload => Ok(file.urls.len() as u64),
            Some(_) => Err(ApiError::validation(format!(
                "file {} is a job output, not a URL list",
                id
            ))),
            None => Err(ApiError::file_not_found(id)),
        }
    }

    pub fn get(&self, id: &FileId) -> Result<StoredFile, ApiError> {
        self.read_files()
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::file_not_found(id))
    }

    /// Allocates the output file for `job_id`.
    pub fn register_output(&self, job_id: JobId) -> FileId {
        let file = StoredFile {
            id: FileId::new(),
            kind: FileKind::Output,
            filename: format!("job-{}-results.csv", job_id),
            urls: Vec::new(),
            job_id: Some(job_id),
            created_at: Utc::now(),
        };
        let id = file.id;
        self.write_files().insert(id, file);
        log::debug!("Registered output file {} for job {}", id, job_id);
        id
    }

    /// Drops an output that was allocated but never attached to a job.
    pub(crate) fn discard_output(&self, id: &FileId) {
        let mut files = self.write_files();
        if files.get(id).map(|f| f.kind) == Some(FileKind::Output) {
            files.remove(id);
        }
    }

    /// Download link for a stored file.
    pub fn download_url(&self, id: &FileId) -> Result<String, ApiError> {
        if !self.read_files().contains_key(id) {
            return Err(ApiError::file_not_found(id));
        }
        Ok(format!("{}/files/{}/download", self.base_url, id))
    }

    pub fn len(&self) -> usize {
        self.read_files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_files(&self) -> RwLockReadGuard<'_, HashMap<FileId, StoredFile>> {
        match self.files.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("File registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_files(&self) -> RwLockWriteGuard<'_, HashMap<FileId, StoredFile>> {
        match self.files.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("File registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Extracts profile URLs from a plain list or the first column of a CSV.
fn parse_url_list(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut skipped = 0usize;

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let first = line
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_matches('"');

        if RE_URL.is_match(first) {
            urls.push(first.to_string());
        } else if urls.is_empty() && skipped == 0 {
            log::debug!("Treating line {} as header: '{}'", n + 1, line);
            skipped += 1;
        } else {
            log::warn!("Skipping line {}: not an http(s) URL", n + 1);
            skipped += 1;
        }
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FileRegistry {
        FileRegistry::new("https://api.example.test/v1/")
    }

    #[test]
    fn test_parse_plain_list() {
        let urls = parse_url_list(
            "https://linkedin.com/in/a\n\n# comment\nhttp://linkedin.com/in/b\n",
        );
        assert_eq!(
            urls,
            vec!["https://linkedin.com/in/a", "http://linkedin.com/in/b"]
        );
    }

    #[test]
    fn test_parse_csv_with_header() {
        let urls = parse_url_list(
            "profile_url,name\n\"https://linkedin.com/in/a\",Ann\nhttps://linkedin.com/in/b,Bob\n",
        );
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://linkedin.com/in/a");
    }

    #[test]
    fn test_parse_skips_garbage_lines() {
        let urls = parse_url_list("url\nhttps://x.io/in/a\nftp://nope\nnot a url\nHTTPS://X.IO/in/b");
        assert_eq!(urls, vec!["https://x.io/in/a", "HTTPS://X.IO/in/b"]);
    }

    #[test]
    fn test_upload_counts_urls() {
        let registry = registry();
        let id = registry
            .upload("leads.txt", b"https://a.io/1\nhttps://a.io/2\nhttps://a.io/3")
            .unwrap();
        assert_eq!(registry.url_count(&id).unwrap(), 3);
        assert_eq!(registry.get(&id).unwrap().kind, FileKind::Upload);
    }

    #[test]
    fn test_upload_rejects_empty_lists() {
        let registry = registry();
        assert!(matches!(
            registry.upload("empty.csv", b"url\n\n# nothing\n"),
            Err(ApiError::Validation { .. })
        ));
        assert!(registry.upload("bin.csv", &[0xff, 0xfe, 0x00]).is_err());
        assert!(registry.upload("  ", b"https://a.io/1").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_file() {
        let registry = registry();
        let id = FileId::new();
        assert!(matches!(
            registry.url_count(&id),
            Err(ApiError::NotFound { resource: "File", .. })
        ));
        assert!(registry.download_url(&id).is_err());
    }

    #[test]
    fn test_output_files() {
        let registry = registry();
        let job = JobId::new();
        let id = registry.register_output(job);

        let url = registry.download_url(&id).unwrap();
        assert_eq!(
            url,
            format!("https://api.example.test/v1/files/{}/download", id)
        );
        assert_eq!(registry.get(&id).unwrap().job_id, Some(job));
        assert!(registry.url_count(&id).is_err());

        registry.discard_output(&id);
        assert!(registry.get(&id).is_err());
    }
}
