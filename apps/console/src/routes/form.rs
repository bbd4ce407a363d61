//! Collects a multipart upload into named files and text fields.

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};

use crate::backend_client::UploadFile;
use crate::errors::AppError;

#[derive(Debug, Default)]
pub struct FormFields {
    files: HashMap<String, UploadFile>,
    texts: HashMap<String, String>,
}

impl FormFields {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = FormFields::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(bad_multipart)?;
            match file_name {
                // empty file inputs arrive as a part with no name and no bytes
                Some(file_name) if file_name.is_empty() && data.is_empty() => {}
                Some(file_name) => {
                    form.files.insert(
                        name,
                        UploadFile {
                            name: file_name,
                            bytes: data,
                        },
                    );
                }
                None => {
                    form.texts
                        .insert(name, String::from_utf8_lossy(&data).into_owned());
                }
            }
        }
        Ok(form)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadFile> {
        self.files.remove(name)
    }

    /// Trimmed text value; blank values count as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::Validation(err.body_text())
}
