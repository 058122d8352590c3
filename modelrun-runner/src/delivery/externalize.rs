//! Output file externalization
//!
//! Workers report files as `{"$file": "/local/path"}` objects anywhere
//! inside an output value. Before the output is recorded, each one is
//! uploaded and replaced in place by the URL it was uploaded to.

use futures::FutureExt;
use futures::future::BoxFuture;
use modelrun_client::{ClientError, FileUploader};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;

use crate::error::FileUploadError;

/// Key marking a file reference in worker output
pub const FILE_KEY: &str = "$file";

/// Path of a file reference, if `value` is one
pub fn file_reference(value: &JsonValue) -> Option<&str> {
    match value {
        JsonValue::Object(map) if map.len() == 1 => map.get(FILE_KEY)?.as_str(),
        _ => None,
    }
}

/// Uploads every file referenced in `value`
///
/// Either every file is uploaded or the whole value is rejected; a partly
/// uploaded output is never returned.
pub async fn externalize(
    value: JsonValue,
    uploader: &dyn FileUploader,
) -> Result<JsonValue, FileUploadError> {
    upload_files(value, uploader).await.map_err(FileUploadError::from)
}

fn upload_files(
    value: JsonValue,
    uploader: &dyn FileUploader,
) -> BoxFuture<'_, Result<JsonValue, ClientError>> {
    async move {
        if let Some(path) = file_reference(&value) {
            let url = uploader.upload(Path::new(path)).await?;
            return Ok(JsonValue::String(url));
        }

        match value {
            JsonValue::Array(items) => {
                let mut uploaded = Vec::with_capacity(items.len());
                for item in items {
                    uploaded.push(upload_files(item, uploader).await?);
                }
                Ok(JsonValue::Array(uploaded))
            }
            JsonValue::Object(map) => {
                let mut uploaded = Map::with_capacity(map.len());
                for (key, item) in map {
                    uploaded.insert(key, upload_files(item, uploader).await?);
                }
                Ok(JsonValue::Object(uploaded))
            }
            other => Ok(other),
        }
    }
    .boxed()
}
