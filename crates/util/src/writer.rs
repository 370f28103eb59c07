//! Destination writers.
//!
//! Writers persist resolved report content under a destination location,
//! creating any intermediate directories a file name implies. The file
//! system is the only implemented destination; its compressed variant
//! stores the content as a single entry inside a `.zip` archive named after
//! the original file.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use postmortem_types::{DestinationType, ReportError};

/// Persists one report's content under a destination.
#[async_trait]
pub trait ReportWriter: Send + Sync + std::fmt::Debug {
    fn write(&self, content: &str, file_name: &str) -> Result<(), ReportError>;

    async fn write_async(&self, content: &str, file_name: &str, cancel: &CancellationToken) -> Result<(), ReportError>;
}

/// Build the writer for a destination. Cloud backends are reserved and
/// fail with [`ReportError::Unsupported`].
pub fn writer_for(destination: DestinationType, location: &str, compress: bool) -> Result<Box<dyn ReportWriter>, ReportError> {
    match destination {
        DestinationType::FileSystem => Ok(Box::new(FileSystemWriter::new(location, compress)?)),
        DestinationType::AzureBlobStorage => Err(ReportError::unsupported("Azure Blob Storage writer is not implemented yet.")),
        DestinationType::AmazonS3 => Err(ReportError::unsupported("Amazon S3 writer is not implemented yet.")),
        DestinationType::GoogleCloudStorage => Err(ReportError::unsupported("Google Cloud Storage writer is not implemented yet.")),
    }
}

/// Writes reports below a base directory, optionally zip-compressed.
#[derive(Debug, Clone)]
pub struct FileSystemWriter {
    base_path: PathBuf,
    compress: bool,
}

impl FileSystemWriter {
    pub fn new(base_path: impl AsRef<Path>, compress: bool) -> Result<Self, ReportError> {
        let base_path = base_path.as_ref();
        if base_path.as_os_str().is_empty() {
            return Err(ReportError::invalid_argument("destination base path must not be empty"));
        }

        Ok(Self {
            base_path: base_path.to_path_buf(),
            compress,
        })
    }

    fn validate(content: &str, file_name: &str) -> Result<(), ReportError> {
        if content.is_empty() {
            return Err(ReportError::invalid_argument("report content must not be empty"));
        }
        if file_name.is_empty() {
            return Err(ReportError::invalid_argument("report file name must not be empty"));
        }
        Ok(())
    }

    fn write_plain(&self, content: &str, file_name: &str) -> Result<(), ReportError> {
        let full_path = self.base_path.join(file_name);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, content)?;
        debug!(path = %full_path.display(), bytes = content.len(), "report written");
        Ok(())
    }

    /// Replace the target extension with `.zip` and store exactly one entry
    /// named the original file name.
    fn write_zipped(&self, content: &str, file_name: &str) -> Result<(), ReportError> {
        let zip_path = self.base_path.join(file_name).with_extension("zip");
        if let Some(parent) = zip_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::File::create(&zip_path)?;
        let mut archive = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        archive
            .start_file(file_name, options)
            .map_err(|error| ReportError::Io(std::io::Error::other(error)))?;
        archive.write_all(content.as_bytes())?;
        archive
            .finish()
            .map_err(|error| ReportError::Io(std::io::Error::other(error)))?;

        debug!(path = %zip_path.display(), entry = file_name, "compressed report written");
        Ok(())
    }
}

#[async_trait]
impl ReportWriter for FileSystemWriter {
    fn write(&self, content: &str, file_name: &str) -> Result<(), ReportError> {
        Self::validate(content, file_name)?;
        if self.compress {
            self.write_zipped(content, file_name)
        } else {
            self.write_plain(content, file_name)
        }
    }

    async fn write_async(&self, content: &str, file_name: &str, cancel: &CancellationToken) -> Result<(), ReportError> {
        Self::validate(content, file_name)?;
        if cancel.is_cancelled() {
            return Err(ReportError::cancelled(format!("write {file_name}")));
        }

        if self.compress {
            // The zip encoder is synchronous; hand it to the blocking pool.
            let writer = self.clone();
            let content = content.to_string();
            let file_name = file_name.to_string();
            tokio::task::spawn_blocking(move || writer.write_zipped(&content, &file_name))
                .await
                .map_err(|error| ReportError::Io(std::io::Error::other(error)))?
        } else {
            let full_path = self.base_path.join(file_name);
            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::select! {
                _ = cancel.cancelled() => Err(ReportError::cancelled(format!("write {file_name}"))),
                result = tokio::fs::write(&full_path, content) => {
                    result?;
                    debug!(path = %full_path.display(), bytes = content.len(), "report written");
                    Ok(())
                }
            }
        }
    }
}
