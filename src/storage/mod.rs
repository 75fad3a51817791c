use crate::config::StorageConfig;
use crate::image::{ImageCodec, Raster};
use crate::utils::error::DetectError;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// 标注图片的固定扩展名
pub const ARTIFACT_EXTENSION: &str = "jpg";

/// 已写入的标注图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub file_name: String,
    pub path: PathBuf,
    /// 静态文件服务可解析的相对URL
    pub url: String,
}

/// 标注图片存储
///
/// 只负责写入和命名，文件由静态文件服务对外提供。
/// 文件名为随机UUID，并发写入互不冲突，不做自动清理。
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    url_prefix: String,
    jpeg_quality: u8,
}

impl ArtifactStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.static_dir).map_err(|e| {
            DetectError::Storage(format!(
                "Failed to create static directory {}: {}",
                config.static_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            root: config.static_dir.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
            jpeg_quality: config.jpeg_quality,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn store(&self, raster: &Raster) -> Result<StoredArtifact> {
        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), ARTIFACT_EXTENSION);
        let path = self.root.join(&file_name);

        ImageCodec::encode(raster, &path, self.jpeg_quality).map_err(|e| match e {
            DetectError::Encode(msg) => DetectError::Storage(msg),
            other => other,
        })?;

        tracing::debug!("Stored artifact: {}", path.display());

        Ok(StoredArtifact {
            url: format!("{}/{}", self.url_prefix, file_name),
            file_name,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn raster() -> Raster {
        Raster::new(Array3::from_elem((12, 20, 3), 200)).unwrap()
    }

    fn store_in(dir: &Path) -> ArtifactStore {
        ArtifactStore::new(&StorageConfig {
            static_dir: dir.to_path_buf(),
            ..StorageConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn writes_uniquely_named_jpegs() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let first = store.store(&raster()).unwrap();
        let second = store.store(&raster()).unwrap();

        assert_ne!(first.file_name, second.file_name);
        assert!(first.file_name.ends_with(".jpg"));
        assert_eq!(first.url, format!("/static/{}", first.file_name));
        assert!(first.path.starts_with(dir.path()));

        let bytes = fs::read(&first.path).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(ImageCodec::decode(&bytes).unwrap().dimensions(), (20, 12));
    }

    #[test]
    fn creates_missing_static_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("static");
        let store = store_in(&nested);
        assert!(nested.is_dir());
        assert_eq!(store.root(), nested.as_path());
    }

    #[test]
    fn write_failure_surfaces_as_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir.path().join("static"));
        fs::remove_dir_all(store.root()).unwrap();

        let err = store.store(&raster()).unwrap_err();
        assert!(matches!(err, DetectError::Storage(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn trailing_slash_in_prefix_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(&StorageConfig {
            static_dir: dir.path().to_path_buf(),
            url_prefix: "/artifacts/".to_string(),
            jpeg_quality: 80,
        })
        .unwrap();
        assert_eq!(store.url_prefix(), "/artifacts");
        assert!(store.store(&raster()).unwrap().url.starts_with("/artifacts/"));
    }
}
