//! Saving base64 image uploads under the public images directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;

use crate::{Error, Result};

/// URL prefix the images directory is served under
pub const IMAGE_URL_PREFIX: &str = "/coral-images/";

const MAX_STEM_LEN: usize = 100;

/// Standard alphabet; trailing `=` padding optional
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static DATA_URL: OnceLock<Regex> = OnceLock::new();
static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();

fn data_url() -> &'static Regex {
    DATA_URL.get_or_init(|| Regex::new(r"(?s)^data:(image/[^;]+);base64,(.+)$").unwrap())
}

fn unsafe_chars() -> &'static Regex {
    UNSAFE_CHARS.get_or_init(|| Regex::new(r"(?i)[^a-z0-9_.-]").unwrap())
}

/// Raw image bytes plus the extension implied by the payload's MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// A stored upload
#[derive(Debug, Clone)]
pub struct SavedImage {
    pub disk_path: PathBuf,
    /// Public URL, always starting with [`IMAGE_URL_PREFIX`]
    pub url: String,
}

/// Decode a data URL (`data:image/png;base64,...`) or bare base64 payload.
/// Unknown or missing MIME types are saved as `jpg`.
pub fn decode_image_payload(payload: &str) -> Result<DecodedImage> {
    let (encoded, extension) = match data_url().captures(payload) {
        Some(caps) => {
            let extension = match &caps[1] {
                "image/png" => "png",
                "image/gif" => "gif",
                "image/webp" => "webp",
                _ => "jpg",
            };
            (caps.get(2).map_or("", |m| m.as_str()), extension)
        }
        None => match payload.find("base64,") {
            Some(idx) if payload.starts_with('/') || payload.starts_with("data:") => (&payload[idx + 7..], "jpg"),
            _ => (payload, "jpg"),
        },
    };

    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = PAYLOAD_ENGINE
        .decode(cleaned.as_bytes())
        .map_err(|e| Error::Validation(format!("invalid base64 image payload: {}", e)))?;
    if bytes.is_empty() {
        return Err(Error::Validation("empty image payload".to_string()));
    }

    Ok(DecodedImage { bytes, extension })
}

/// Replace anything outside `[A-Za-z0-9_.-]` with `-` and cap the length
pub fn sanitize_file_stem(name: &str) -> String {
    let safe: String = unsafe_chars()
        .replace_all(name, "-")
        .chars()
        .take(MAX_STEM_LEN)
        .collect();
    if safe.is_empty() { "upload".to_string() } else { safe }
}

/// Write `image` as `<millis>-<sanitized name>.<ext>` inside `images_dir`
pub fn save_upload(images_dir: &Path, image_name: &str, image: &DecodedImage, millis: i64) -> Result<SavedImage> {
    if let Err(e) = std::fs::create_dir_all(images_dir) {
        tracing::warn!("Could not create images directory {}: {}", images_dir.display(), e);
    }

    let file_name = format!("{}-{}.{}", millis, sanitize_file_stem(image_name), image.extension);
    let disk_path = images_dir.join(&file_name);
    std::fs::write(&disk_path, &image.bytes)?;

    tracing::debug!("Saved upload to {}", disk_path.display());
    Ok(SavedImage {
        disk_path,
        url: format!("{}{}", IMAGE_URL_PREFIX, file_name),
    })
}

/// Map a public image URL back to its file, if it points into `images_dir`
pub fn local_image_path(images_dir: &Path, url: &str) -> Option<PathBuf> {
    let file_name = url.strip_prefix(IMAGE_URL_PREFIX)?;
    if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
        return None;
    }
    Some(images_dir.join(file_name))
}
