//! Storage of uploaded logos and favicons on the local filesystem

use std::io;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::re_exports::uuid::Uuid;
use vitrine_core::schema::setting_keys;
use vitrine_core::stuff::api_error::ApiError;

/// Image types accepted as upload, by file extension
const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"];

/// What an upload is used for
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UploadKind {
    /// The company logo
    Logo,

    /// The favicon
    Favicon,
}

impl UploadKind {
    /// The setting pointing to the current upload of this kind
    pub fn setting_key(self) -> &'static str {
        match self {
            UploadKind::Logo => setting_keys::LOGO_PATH,
            UploadKind::Favicon => setting_keys::FAVICON_PATH,
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            UploadKind::Logo => "logo",
            UploadKind::Favicon => "favicon",
        }
    }
}

/// Error returned by [`UploadStorage`]
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload contains no bytes.
    #[error("The uploaded file is empty")]
    Empty,

    /// The upload exceeds the configured maximum size.
    #[error("The uploaded file exceeds {max} bytes")]
    TooLarge {
        /// The configured maximum
        max: usize,
    },

    /// Neither file name nor content type identify an accepted image type.
    #[error("Unsupported file type")]
    UnsupportedType,

    /// The requested file name tries to escape the upload directory.
    #[error("Invalid file name")]
    InvalidName,

    /// Reading or writing the file failed.
    #[error("Upload storage failed: {0}")]
    Io(#[from] io::Error),
}

impl From<UploadError> for ApiError {
    #[track_caller]
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::Empty => ApiError::bad_request("The uploaded file is empty"),
            UploadError::TooLarge { .. } => ApiError::bad_request("The uploaded file is too large"),
            UploadError::UnsupportedType => ApiError::bad_request("Unsupported file type"),
            UploadError::InvalidName => ApiError::not_found("Unknown file"),
            UploadError::Io(error) if error.kind() == io::ErrorKind::NotFound => {
                ApiError::not_found("Unknown file").with_source(error)
            }
            UploadError::Io(error) => {
                ApiError::server_error("Upload storage failed").with_source(error)
            }
        }
    }
}

/// Writes uploads into a directory served under a url prefix
#[derive(Debug, Clone)]
pub struct UploadStorage {
    dir: PathBuf,
    prefix: String,
    max_size: usize,
}

impl UploadStorage {
    /// Constructs a storage writing into `dir` whose files are reachable under `prefix`
    pub fn new(dir: impl Into<PathBuf>, prefix: &str, max_size: usize) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.trim_end_matches('/').to_string(),
            max_size,
        }
    }

    /// The configured maximum size of a single upload in bytes
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// The url path uploads are served under, without trailing slash
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The directory uploads are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` as a new file and returns the url path it is served under
    ///
    /// The file is named `{kind}-{unix millis}-{random uuid}.{extension}`,
    /// so every upload gets a fresh url and previous files stay untouched,
    /// even if two uploads arrive within the same millisecond.
    pub async fn store(
        &self,
        kind: UploadKind,
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_size {
            return Err(UploadError::TooLarge { max: self.max_size });
        }
        let extension = detect_extension(file_name, content_type)?;

        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let name = format!(
            "{}-{millis}-{}.{extension}",
            kind.file_stem(),
            Uuid::new_v4().simple()
        );

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&name), bytes).await?;

        let url = format!("{}/{name}", self.prefix);
        info!(
            upload.kind = kind.file_stem(),
            upload.url = url.as_str(),
            upload.size = bytes.len(),
            "Stored upload"
        );
        Ok(url)
    }

    /// Removes a file previously returned by [`UploadStorage::store`]
    pub async fn remove(&self, url: &str) -> Result<(), UploadError> {
        let name = url
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or(UploadError::InvalidName)?;
        tokio::fs::remove_file(self.path_of(name)?).await?;
        Ok(())
    }

    /// Reads a stored file by its name returning its content type and bytes
    pub async fn read(&self, name: &str) -> Result<(&'static str, Vec<u8>), UploadError> {
        let path = self.path_of(name)?;
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .ok_or(UploadError::InvalidName)?;
        let content_type = content_type_of(extension).ok_or(UploadError::InvalidName)?;
        let bytes = tokio::fs::read(&path).await?;
        Ok((content_type, bytes))
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, UploadError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(UploadError::InvalidName);
        }
        Ok(self.dir.join(name))
    }
}

fn detect_extension(
    file_name: Option<&str>,
    content_type: Option<&str>,
) -> Result<&'static str, UploadError> {
    let from_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .and_then(|extension| {
            ALLOWED_EXTENSIONS
                .iter()
                .copied()
                .find(|allowed| *allowed == extension)
        });
    let from_type = || {
        ALLOWED_EXTENSIONS
            .iter()
            .copied()
            .find(|extension| content_type_of(extension) == content_type)
    };
    from_name.or_else(from_type).ok_or(UploadError::UnsupportedType)
}

fn content_type_of(extension: &str) -> Option<&'static str> {
    Some(match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        _ => return None,
    })
}
