//! Input preparation
//!
//! Remote inputs are downloaded to temporary files and handed to the worker
//! as local paths. The files live as long as the returned [`ResolvedInputs`]
//! downloads do.

use modelrun_client::{ClientError, RemoteFetcher};
use modelrun_core::domain::prediction::{InputValue, PredictionInput};
use serde_json::{Map, Value as JsonValue};
use tempfile::TempPath;
use tracing::debug;

/// Inputs as the worker sees them
pub struct ResolvedInputs {
    values: Map<String, JsonValue>,
    downloads: Vec<TempPath>,
}

impl ResolvedInputs {
    /// Splits into the worker payload and the files backing it
    pub fn into_parts(self) -> (Map<String, JsonValue>, Vec<TempPath>) {
        (self.values, self.downloads)
    }
}

/// Downloads every remote input
///
/// On error, files downloaded so far are removed before returning.
pub async fn resolve_inputs(
    input: &PredictionInput,
    fetcher: &dyn RemoteFetcher,
) -> Result<ResolvedInputs, ClientError> {
    let mut values = Map::new();
    let mut downloads = Vec::new();

    for (name, value) in input {
        let resolved = match value {
            InputValue::Value(value) => value.clone(),
            InputValue::Remote(remote) => {
                let path = fetcher.fetch(remote.url()).await?;
                debug!("Downloaded input '{}' to {}", name, path.display());
                let local = JsonValue::String(path.to_string_lossy().into_owned());
                downloads.push(path);
                local
            }
        };
        values.insert(name.clone(), resolved);
    }

    Ok(ResolvedInputs { values, downloads })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFetcher;
    use serde_json::json;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_plain_values_are_copied() {
        let fetcher = FakeFetcher::default();
        let input = PredictionInput::from([
            ("text".to_string(), InputValue::from(json!("hello"))),
            ("steps".to_string(), InputValue::from(json!(20))),
        ]);

        let resolved = resolve_inputs(&input, &fetcher).await.unwrap();

        assert_eq!(
            JsonValue::Object(resolved.values),
            json!({"text": "hello", "steps": 20})
        );
        assert!(fetcher.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_remote_inputs_become_local_paths() {
        let fetcher = FakeFetcher::default();
        let input = PredictionInput::from([(
            "image".to_string(),
            InputValue::remote("https://example.test/cat.png"),
        )]);

        let (values, downloads) = resolve_inputs(&input, &fetcher)
            .await
            .unwrap()
            .into_parts();

        let path = PathBuf::from(values["image"].as_str().unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "https://example.test/cat.png"
        );

        drop(downloads);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failure_removes_earlier_downloads() {
        let fetcher = FakeFetcher::failing_on("https://example.test/missing.png");
        let input = PredictionInput::from([
            ("a".to_string(), InputValue::remote("https://example.test/ok.png")),
            (
                "b".to_string(),
                InputValue::remote("https://example.test/missing.png"),
            ),
        ]);

        let err = resolve_inputs(&input, &fetcher).await.err().unwrap();

        assert_eq!(err.status(), Some(404));
        let fetched = fetcher.fetched();
        assert_eq!(fetched.len(), 1);
        assert!(!fetched[0].exists());
    }
}
