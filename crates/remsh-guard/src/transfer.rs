//! File transfer target and source validation

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use tracing::debug;

use crate::error::TransferRejection;

/// Largest file accepted for upload (500 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Extensions accepted for upload, compared case-insensitively
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    // text and logs
    "txt", "md", "rst", "log", "csv", "tsv",
    // config
    "json", "yaml", "yml", "toml", "ini", "conf", "cfg", "xml", "properties",
    // source
    "sh", "bash", "zsh", "py", "rb", "pl", "php", "js", "ts", "java", "kt", "go", "rs", "c",
    "h", "cpp", "hpp", "cs", "swift", "sql", "html", "css",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z",
    // office
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf",
];

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Result of a successful upload validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    /// Size of the local source in bytes
    pub size: u64,
    /// Final path component of the remote destination
    pub file_name: String,
}

/// Whitelisting validator for transfer paths and upload sources
#[derive(Debug, Clone)]
pub struct TransferValidator {
    max_upload_bytes: u64,
    allowed_extensions: HashSet<&'static str>,
}

impl TransferValidator {
    pub fn new() -> Self {
        Self::with_max_upload(MAX_UPLOAD_BYTES)
    }

    pub fn with_max_upload(max_upload_bytes: u64) -> Self {
        Self {
            max_upload_bytes,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().copied().collect(),
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Whether an extension (without the dot) is on the allow-list
    pub fn is_extension_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions
            .contains(extension.to_ascii_lowercase().as_str())
    }

    /// Check a remote destination path, returning its file name
    pub fn validate_remote_path(&self, path: &str) -> Result<String, TransferRejection> {
        let has_traversal = path.contains("../")
            || path.contains("..\\")
            || path.split(['/', '\\']).any(|part| part == "..");
        if has_traversal {
            return Err(TransferRejection::PathTraversal(path.to_string()));
        }

        let has_drive = path.len() >= 2
            && path.as_bytes()[0].is_ascii_alphabetic()
            && path.as_bytes()[1] == b':';
        if path.starts_with('/') || path.starts_with('\\') || has_drive {
            return Err(TransferRejection::AbsolutePath(path.to_string()));
        }

        if let Some(c) = path
            .chars()
            .find(|c| INVALID_FILENAME_CHARS.contains(c) || c.is_control())
        {
            return Err(TransferRejection::InvalidCharacter(c));
        }

        let file_name = path.rsplit(['/', '\\']).next().unwrap_or("").trim();
        if file_name.starts_with('.') {
            return Err(TransferRejection::HiddenFile(file_name.to_string()));
        }
        if file_name.is_empty() {
            return Err(TransferRejection::EmptyFileName);
        }

        Ok(file_name.to_string())
    }

    /// Check a local upload source, returning its size
    pub fn validate_upload_source(&self, local: &Path) -> Result<u64, TransferRejection> {
        let metadata = match std::fs::metadata(local) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferRejection::SourceMissing(local.to_path_buf()));
            }
            Err(e) => {
                return Err(TransferRejection::SourceUnreadable {
                    path: local.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };
        if !metadata.is_file() {
            return Err(TransferRejection::SourceUnreadable {
                path: local.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }
        File::open(local).map_err(|e| TransferRejection::SourceUnreadable {
            path: local.to_path_buf(),
            reason: e.to_string(),
        })?;

        let size = metadata.len();
        if size > self.max_upload_bytes {
            return Err(TransferRejection::FileTooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }

        let extension = local
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .ok_or(TransferRejection::MissingExtension)?;
        if !self.is_extension_allowed(extension) {
            return Err(TransferRejection::ExtensionNotAllowed(extension.to_string()));
        }

        Ok(size)
    }

    /// Full upload check: remote path first, then the local source
    pub fn validate_upload(
        &self,
        local: &Path,
        remote_path: &str,
    ) -> Result<UploadPlan, TransferRejection> {
        let file_name = self.validate_remote_path(remote_path)?;
        let size = self.validate_upload_source(local)?;
        debug!(remote = %remote_path, size, "Upload validated");
        Ok(UploadPlan { size, file_name })
    }
}

impl Default for TransferValidator {
    fn default() -> Self {
        Self::new()
    }
}
