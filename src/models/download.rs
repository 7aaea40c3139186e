//! Model acquisition: ONNX file downloads, archive extraction and Hub fetches
//!
//! Downloads are streamed to a `.part` file and only renamed or unpacked once
//! complete. Archives keep only their regular files, and every file lands
//! directly in the target directory whatever folder structure it carries.

use super::cache::{DICT_FILE, MODEL_FILE, dict_file, model_file, target_dir};
use super::catalog::{ModelArchive, ModelSource};
use crate::error::{OcrError, OcrResult};
use futures::StreamExt;
use hf_hub::api::tokio::ApiBuilder;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Downloads model archives into the model home
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
}

impl Downloader {
    pub fn new(timeout: Duration, retries: u32) -> OcrResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrError::download("<client>", e))?;

        Ok(Self {
            client,
            retries,
            retry_delay: Duration::from_secs(2),
        })
    }

    /// Override the delay between retries (multiplied by the attempt number)
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Install an archive under `home`, returning its model directory
    pub async fn install(&self, home: &Path, archive: &ModelArchive) -> OcrResult<PathBuf> {
        let dir = target_dir(home, archive);
        tokio::fs::create_dir_all(&dir).await?;

        tracing::info!(
            model = %archive.name,
            kind = %archive.kind,
            target = ?dir,
            "Installing model"
        );

        if !model_file(&dir).is_file() {
            match &archive.source {
                ModelSource::File { url } => self.fetch_model_file(url, &dir).await?,
                ModelSource::Archive { url } => self.fetch_archive(url, &dir).await?,
                ModelSource::Hub { repo, file } => {
                    fetch_hub_file(repo, file, &dir, &home.join("hub")).await?
                }
            }
        }

        if let Some(dict_url) = &archive.dict_url
            && !dict_file(&dir).is_file()
        {
            self.fetch_dict(dict_url, &dir).await?;
        }

        tracing::info!(model = %archive.name, "Model installed");
        Ok(dir)
    }

    async fn fetch_dict(&self, url: &str, dir: &Path) -> OcrResult<()> {
        let part = dir.join(format!("{}.part", DICT_FILE));
        self.download_to_file(url, &part).await?;
        tokio::fs::rename(&part, dict_file(dir)).await?;
        Ok(())
    }

    async fn fetch_model_file(&self, url: &str, dir: &Path) -> OcrResult<()> {
        let part = dir.join(format!("{}.part", MODEL_FILE));
        self.download_to_file(url, &part).await?;
        tokio::fs::rename(&part, model_file(dir)).await?;
        Ok(())
    }

    async fn fetch_archive(&self, url: &str, dir: &Path) -> OcrResult<()> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".to_string());
        let part = dir.with_file_name(format!("{}.tar.part", name));

        self.download_to_file(url, &part).await?;

        let extract_dir = dir.to_path_buf();
        let archive_path = part.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extract_archive(&archive_path, &extract_dir))
                .await
                .map_err(|e| OcrError::download(url, e));
        let _ = tokio::fs::remove_file(&part).await;

        let result = match extracted.and_then(|r| r) {
            Ok(count) if model_file(dir).is_file() => {
                tracing::debug!(url = %url, files = count, "Archive extracted");
                Ok(())
            }
            Ok(_) => Err(OcrError::InvalidArchive {
                path: dir.to_path_buf(),
                message: format!("archive from {} does not contain {}", url, MODEL_FILE),
            }),
            Err(OcrError::InvalidArchive { message, .. }) => Err(OcrError::InvalidArchive {
                path: dir.to_path_buf(),
                message: format!("archive from {}: {}", url, message),
            }),
            Err(e) => Err(e),
        };

        if result.is_err() {
            // Leave nothing half-extracted behind
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
        result
    }

    /// Stream a URL to `dest`, retrying transient failures
    async fn download_to_file(&self, url: &str, dest: &Path) -> OcrResult<()> {
        let mut attempt = 0;
        loop {
            match self.try_download(url, dest).await {
                Ok(bytes) => {
                    tracing::debug!(url = %url, bytes, "Download complete");
                    crate::metrics::record_download(true);
                    return Ok(());
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        url = %url,
                        attempt,
                        max_retries = self.retries,
                        error = %e,
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(dest).await;
                    crate::metrics::record_download(false);
                    return Err(e);
                }
            }
        }
    }

    async fn try_download(&self, url: &str, dest: &Path) -> OcrResult<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OcrError::download(url, e))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| OcrError::download(url, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// Download a single ONNX file from the HuggingFace Hub into `dir`
async fn fetch_hub_file(repo: &str, file: &str, dir: &Path, cache_dir: &Path) -> OcrResult<()> {
    let source = format!("hf://{}/{}", repo, file);
    tracing::info!(repo = %repo, file = %file, "Fetching model via hf-hub");

    let api = ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .build()
        .map_err(|e| OcrError::download(&source, format!("Failed to create HF API client: {}", e)))?;

    let path = api
        .model(repo.to_string())
        .get(file)
        .await
        .map_err(|e| OcrError::download(&source, e))?;

    tokio::fs::copy(&path, model_file(dir)).await?;
    Ok(())
}

/// Unpack the regular files of a tar archive flat into `dest`
///
/// Returns the number of files written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> OcrResult<usize> {
    let invalid = |message: String| OcrError::InvalidArchive {
        path: archive_path.to_path_buf(),
        message,
    };

    let file = std::fs::File::open(archive_path)?;
    let mut archive = tar::Archive::new(file);
    let entries = archive.entries().map_err(|e| invalid(e.to_string()))?;

    std::fs::create_dir_all(dest)?;
    let mut count = 0;

    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let file_name = {
            let path = entry.path().map_err(|e| invalid(e.to_string()))?;
            match path.file_name() {
                Some(name) => name.to_os_string(),
                None => continue,
            }
        };

        entry
            .unpack(dest.join(&file_name))
            .map_err(|e| invalid(e.to_string()))?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tar(path: &Path, files: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_extract_flattens_nested_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tar_path = temp_dir.path().join("model.tar");
        build_tar(
            &tar_path,
            &[
                ("en_PP-OCRv3_det_infer/inference.onnx", b"weights"),
                ("en_PP-OCRv3_det_infer/inference.yml", b"cfg"),
            ],
        );

        let dest = temp_dir.path().join("out");
        let count = extract_archive(&tar_path, &dest).unwrap();

        assert_eq!(count, 2);
        assert_eq!(std::fs::read(dest.join("inference.onnx")).unwrap(), b"weights");
        assert!(dest.join("inference.yml").is_file());
        assert!(!dest.join("en_PP-OCRv3_det_infer").exists());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tar_path = temp_dir.path().join("bad.tar");
        std::fs::write(&tar_path, vec![0xffu8; 1024]).unwrap();

        let result = extract_archive(&tar_path, &temp_dir.path().join("out"));
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = extract_archive(&temp_dir.path().join("nope.tar"), temp_dir.path());
        assert!(matches!(result, Err(OcrError::Io(_))));
    }

    #[test]
    fn test_downloader_creation() {
        let downloader = Downloader::new(Duration::from_secs(5), 1);
        assert!(downloader.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_url_fails_without_retry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Duration::from_secs(2), 0).unwrap();
        let dest = temp_dir.path().join("file.part");

        let result = downloader
            .download_to_file("http://127.0.0.1:9/missing.tar", &dest)
            .await;

        assert!(matches!(result, Err(OcrError::Download { .. })));
        assert!(!dest.exists());
    }
}
