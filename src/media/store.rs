use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, info};
use tokio::fs;
use uuid::Uuid;

use super::{Config, PUBLIC_PREFIX, Upload};

#[async_trait]
pub trait MediaStore {
    /// Stores the upload and returns its public reference.
    async fn store(&self, upload: &Upload) -> super::Result<String>;
}

pub struct FsMediaStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl FsMediaStore {
    pub async fn new(config: &Config) -> super::Result<Self> {
        fs::create_dir_all(config.dir()).await?;
        info!("media store initialized at {}", config.dir().display());

        Ok(Self {
            dir: config.dir().clone(),
            max_bytes: config.max_bytes(),
        })
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn store(&self, upload: &Upload) -> super::Result<String> {
        check_size(upload, self.max_bytes)?;

        let file_name = format!("{}.{}", Uuid::new_v4(), upload.extension());
        fs::write(self.dir.join(&file_name), upload.bytes()).await?;
        debug!("stored {} bytes as {file_name}", upload.bytes().len());

        Ok(format!("{PUBLIC_PREFIX}/{file_name}"))
    }
}

pub(crate) fn check_size(upload: &Upload, max_bytes: usize) -> super::Result<()> {
    let size = upload.bytes().len();
    if size == 0 {
        return Err(super::Error::Empty);
    }
    if size > max_bytes {
        return Err(super::Error::TooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}
