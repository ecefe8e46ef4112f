use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use log::warn;

use store::MediaStore;

use crate::message;

pub mod form;
pub mod store;

type Result<T> = std::result::Result<T, Error>;
pub type Store = Arc<dyn MediaStore + Send + Sync>;

/// Public path prefix under which stored files are served.
pub const PUBLIC_PREFIX: &str = "/media";

#[derive(Clone)]
pub struct Config {
    dir: PathBuf,
    max_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("media"),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn env() -> Option<Self> {
        let dir = env::var("MEDIA_DIR").ok();
        let max_bytes = env::var("MEDIA_MAX_BYTES").ok().and_then(|s| s.parse().ok());

        match (dir, max_bytes) {
            (None, None) => {
                warn!("MEDIA env is not configured, using defaults");
                None
            }
            (dir, max_bytes) => {
                let default = Self::default();
                Some(Self {
                    dir: dir.map(PathBuf::from).unwrap_or(default.dir),
                    max_bytes: max_bytes.unwrap_or(default.max_bytes),
                })
            }
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

/// A file received from a client, not yet stored.
#[derive(Clone, Debug)]
pub struct Upload {
    file_name: Option<String>,
    content_type: String,
    bytes: Bytes,
}

impl Upload {
    pub fn new(
        file_name: Option<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name,
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn kind(&self) -> message::Kind {
        let mime = self.content_type.to_ascii_lowercase();
        if mime.starts_with("image/") {
            message::Kind::Image
        } else if mime.starts_with("audio/") {
            message::Kind::Audio
        } else {
            message::Kind::File
        }
    }

    /// Extension of the stored file: the client's one when it is a plain
    /// short token, otherwise derived from the content type.
    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            });

        from_name.unwrap_or_else(|| {
            match self.content_type.as_str() {
                "image/png" => "png",
                "image/jpeg" => "jpg",
                "image/gif" => "gif",
                "image/webp" => "webp",
                "audio/mpeg" => "mp3",
                "audio/ogg" => "ogg",
                "audio/webm" => "webm",
                "application/pdf" => "pdf",
                _ => "bin",
            }
            .to_owned()
        })
    }
}

/// PNG identicon derived from `seed`.
pub fn identicon(seed: &str) -> Result<Vec<u8>> {
    let png = identicon_rs::Identicon::new(seed).export_png_data()?;
    Ok(png)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("uploaded file is empty")]
    Empty,
    #[error("uploaded file is too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("expected an image, got {0}")]
    NotAnImage(String),
    #[error("missing file part")]
    MissingFile,

    #[error(transparent)]
    _Multipart(#[from] axum::extract::multipart::MultipartError),
    #[error(transparent)]
    _Io(#[from] std::io::Error),
    #[error(transparent)]
    _Identicon(#[from] identicon_rs::error::IdenticonError),
}

impl From<Error> for axum::http::StatusCode {
    fn from(e: Error) -> Self {
        match e {
            Error::Empty | Error::MissingFile | Error::_Multipart(_) => Self::BAD_REQUEST,
            Error::TooLarge { .. } => Self::PAYLOAD_TOO_LARGE,
            Error::NotAnImage(_) => Self::UNSUPPORTED_MEDIA_TYPE,
            Error::_Io(_) | Error::_Identicon(_) => Self::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_infer_kind_from_content_type() {
        let upload = |mime: &str| Upload::new(None, mime, vec![1]);

        assert_eq!(upload("image/jpeg").kind(), message::Kind::Image);
        assert_eq!(upload("Audio/Ogg").kind(), message::Kind::Audio);
        assert_eq!(upload("application/pdf").kind(), message::Kind::File);
        assert_eq!(upload("").kind(), message::Kind::File);
    }

    #[test]
    fn should_pick_extension_from_name_or_content_type() {
        let named = Upload::new(Some("vacances.JPEG".into()), "image/jpeg", vec![1]);
        let hostile = Upload::new(Some("x.p/../hp".into()), "image/png", vec![1]);
        let anonymous = Upload::new(None, "application/octet-stream", vec![1]);

        assert_eq!(named.extension(), "jpeg");
        assert_eq!(hostile.extension(), "png");
        assert_eq!(anonymous.extension(), "bin");
    }
}
