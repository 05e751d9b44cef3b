//! ============================================================================
//! Image Attachments - Bounded photo collection per device
//! ============================================================================
//! Photos are encoded to data URLs before being attached:
//! - A batch only fills the slots left on the device; the excess is dropped
//! - A file that fails to encode is skipped, the rest of the batch proceeds
//! - Encodes run concurrently and are joined before the batch completes
//! ============================================================================

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::{DeviceRecord, MAX_IMAGES_PER_DEVICE};

/// Where the bytes of a raw image come from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Bytes { mime_type: String, data: Vec<u8> },
    Path(PathBuf),
}

/// An image picked by the user, not yet encoded
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub name: String,
    pub source: ImageSource,
}

impl RawImage {
    pub fn from_bytes(name: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            source: ImageSource::Bytes {
                mime_type: mime_type.to_string(),
                data,
            },
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            source: ImageSource::Path(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("Could not read {name}: {reason}")]
    Unreadable { name: String, reason: String },

    #[error("{0} is empty")]
    Empty(String),
}

/// Turns raw image bytes into the text payload stored on a device
#[async_trait]
pub trait ImageEncoder: Send + Sync {
    async fn encode(&self, image: &RawImage) -> Result<String, EncodeError>;
}

/// Encodes images as `data:<mime>;base64,<payload>` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlEncoder;

#[async_trait]
impl ImageEncoder for DataUrlEncoder {
    async fn encode(&self, image: &RawImage) -> Result<String, EncodeError> {
        let (mime_type, data) = match &image.source {
            ImageSource::Bytes { mime_type, data } => (mime_type.clone(), data.clone()),
            ImageSource::Path(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| EncodeError::Unreadable {
                        name: image.name.clone(),
                        reason: e.to_string(),
                    })?;
                (mime_for_path(path).to_string(), data)
            }
        };

        if data.is_empty() {
            return Err(EncodeError::Empty(image.name.clone()));
        }

        Ok(format!("data:{};base64,{}", mime_type, STANDARD.encode(&data)))
    }
}

/// MIME type guessed from a file extension
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Result of encoding one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedBatch {
    /// Encoded payloads, in input order
    pub images: Vec<String>,
    /// Files beyond the remaining capacity, never encoded
    pub dropped: usize,
    /// Names of files that failed to encode
    pub skipped: Vec<String>,
}

/// Encode at most `remaining` files of `files`
pub async fn encode_batch(
    encoder: &dyn ImageEncoder,
    remaining: usize,
    files: &[RawImage],
) -> EncodedBatch {
    let take = remaining.min(files.len());
    let dropped = files.len() - take;
    if dropped > 0 {
        debug!("Dropping {} image(s) beyond device capacity", dropped);
    }

    let results = join_all(files[..take].iter().map(|file| encoder.encode(file))).await;

    let mut batch = EncodedBatch {
        dropped,
        ..EncodedBatch::default()
    };
    for (file, result) in files[..take].iter().zip(results) {
        match result {
            Ok(encoded) => batch.images.push(encoded),
            Err(e) => {
                warn!("Skipping image {}: {}", file.name, e);
                batch.skipped.push(file.name.clone());
            }
        }
    }
    batch
}

/// What happened to an attach request
#[derive(Debug, Clone, PartialEq)]
pub enum AttachOutcome {
    /// Some or all files were attached
    Attached {
        added: usize,
        dropped: usize,
        skipped: Vec<String>,
    },
    /// The device already holds MAX_IMAGES_PER_DEVICE photos
    CapacityReached,
    DeviceNotFound,
}

impl AttachOutcome {
    pub fn added(&self) -> usize {
        match self {
            AttachOutcome::Attached { added, .. } => *added,
            _ => 0,
        }
    }

    /// Message for the user when the attach was not a clean success
    pub fn warning(&self) -> Option<String> {
        match self {
            AttachOutcome::Attached { skipped, .. } if !skipped.is_empty() => Some(format!(
                "Some files were skipped because they could not be read: {}",
                skipped.join(", ")
            )),
            AttachOutcome::Attached { .. } => None,
            AttachOutcome::CapacityReached => Some(format!(
                "Limit reached: a device can have at most {} photos",
                MAX_IMAGES_PER_DEVICE
            )),
            AttachOutcome::DeviceNotFound => Some("Device not found".to_string()),
        }
    }
}

impl DeviceRecord {
    /// Photos that can still be attached
    pub fn image_slots_left(&self) -> usize {
        MAX_IMAGES_PER_DEVICE.saturating_sub(self.images.len())
    }

    /// Append encoded images up to capacity. Returns how many were kept.
    pub(crate) fn push_images(&mut self, encoded: Vec<String>) -> usize {
        let keep = self.image_slots_left().min(encoded.len());
        self.images.extend(encoded.into_iter().take(keep));
        keep
    }

    /// Remove the photo at `index`. Out of range is a no-op.
    pub fn remove_image(&mut self, index: usize) -> bool {
        if index < self.images.len() {
            self.images.remove(index);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails on any file whose name starts with "bad"
    struct PickyEncoder;

    #[async_trait]
    impl ImageEncoder for PickyEncoder {
        async fn encode(&self, image: &RawImage) -> Result<String, EncodeError> {
            if image.name.starts_with("bad") {
                Err(EncodeError::Empty(image.name.clone()))
            } else {
                Ok(format!("enc:{}", image.name))
            }
        }
    }

    fn files(names: &[&str]) -> Vec<RawImage> {
        names
            .iter()
            .map(|n| RawImage::from_bytes(n, "image/png", vec![1, 2, 3]))
            .collect()
    }

    #[tokio::test]
    async fn test_data_url_encoding() {
        let image = RawImage::from_bytes("a.png", "image/png", b"hello".to_vec());
        let encoded = DataUrlEncoder.encode(&image).await.unwrap();
        assert_eq!(encoded, "data:image/png;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn test_empty_image_fails() {
        let image = RawImage::from_bytes("a.png", "image/png", vec![]);
        assert_eq!(
            DataUrlEncoder.encode(&image).await,
            Err(EncodeError::Empty("a.png".into()))
        );
    }

    #[tokio::test]
    async fn test_encode_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.JPG");
        std::fs::write(&path, b"hello").unwrap();

        let encoded = DataUrlEncoder.encode(&RawImage::from_path(&path)).await.unwrap();
        assert_eq!(encoded, "data:image/jpeg;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn test_missing_path_is_unreadable() {
        let image = RawImage::from_path("/definitely/not/here.png");
        let err = DataUrlEncoder.encode(&image).await.unwrap_err();
        assert!(matches!(err, EncodeError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_batch_respects_remaining() {
        let batch = encode_batch(&PickyEncoder, 2, &files(&["a", "b", "c", "d"])).await;
        assert_eq!(batch.images, vec!["enc:a", "enc:b"]);
        assert_eq!(batch.dropped, 2);
        assert!(batch.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_batch_skips_failures_in_order() {
        let batch = encode_batch(&PickyEncoder, 5, &files(&["a", "bad1", "c", "bad2"])).await;
        assert_eq!(batch.images, vec!["enc:a", "enc:c"]);
        assert_eq!(batch.skipped, vec!["bad1", "bad2"]);
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn test_push_images_caps_at_max() {
        let mut device = DeviceRecord::blank();
        let kept = device.push_images((0..7).map(|i| i.to_string()).collect());
        assert_eq!(kept, MAX_IMAGES_PER_DEVICE);
        assert_eq!(device.images.len(), MAX_IMAGES_PER_DEVICE);
        assert_eq!(device.image_slots_left(), 0);
        assert_eq!(device.push_images(vec!["x".into()]), 0);
    }

    #[test]
    fn test_remove_image() {
        let mut device = DeviceRecord::blank();
        device.push_images(vec!["a".into(), "b".into(), "c".into()]);
        assert!(device.remove_image(1));
        assert_eq!(device.images, vec!["a", "c"]);
        assert!(!device.remove_image(5));
        assert_eq!(device.images.len(), 2);
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("x.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("x.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("x")), "application/octet-stream");
    }

    #[test]
    fn test_outcome_warnings() {
        let clean = AttachOutcome::Attached {
            added: 2,
            dropped: 1,
            skipped: vec![],
        };
        assert_eq!(clean.warning(), None);
        assert_eq!(clean.added(), 2);

        let partial = AttachOutcome::Attached {
            added: 1,
            dropped: 0,
            skipped: vec!["bad.png".into()],
        };
        assert!(partial.warning().unwrap().contains("bad.png"));
        assert!(AttachOutcome::CapacityReached.warning().is_some());
        assert_eq!(AttachOutcome::CapacityReached.added(), 0);
    }
}
