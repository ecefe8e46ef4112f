use std::collections::HashMap;

use axum::extract::Multipart;

use super::Upload;

const FILE_PART: &str = "file";

/// Text parts and the optional `file` part of a multipart body.
#[derive(Default)]
pub struct Form {
    fields: HashMap<String, String>,
    upload: Option<Upload>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> super::Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();

            if name == FILE_PART {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let bytes = field.bytes().await?;
                form.upload = Some(Upload::new(file_name, content_type, bytes));
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_upload(&mut self) -> Option<Upload> {
        self.upload.take()
    }
}
