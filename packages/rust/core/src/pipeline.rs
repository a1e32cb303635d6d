//! The convert pipeline: reference in, EPUB path out.

use std::path::{Path, PathBuf};

use tracing::info;

use ranopress_acquire::{ApiClient, acquire_book};
use ranopress_epub::EpubBuilder;
use ranopress_shared::{AppConfig, FetchPolicy, ProgressReporter, Result, ScaledProgress};

/// Run the full pipeline: acquire the book into `output_dir`, then assemble
/// the EPUB beside the record. Returns the EPUB path.
///
/// Progress: acquisition fills (0.05, 0.80], assembly the rest. The combined
/// stream of fractions is non-decreasing.
pub async fn run(
    reference: &str,
    output_dir: &Path,
    config: &AppConfig,
    progress: &dyn ProgressReporter,
) -> Result<PathBuf> {
    progress.report(0.0, "starting");
    info!(reference, output = %output_dir.display(), "pipeline started");

    let client = ApiClient::new(&config.network)?;
    let policy = FetchPolicy::from(config);

    let acquisition = ScaledProgress::new(progress, 0.05, 0.80);
    let record_path = acquire_book(reference, output_dir, &client, &policy, &acquisition).await?;

    progress.report(0.80, "building EPUB");
    let epub_path = EpubBuilder::load(&record_path, config.defaults.image_quality)?.assemble()?;

    progress.report(1.0, "done");
    info!(path = %epub_path.display(), "pipeline finished");
    Ok(epub_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingProgress(Mutex<Vec<f64>>);

    impl ProgressReporter for RecordingProgress {
        fn report(&self, fraction: f64, _message: &str) {
            self.0.lock().unwrap().push(fraction);
        }
    }

    #[tokio::test]
    async fn full_run_produces_epub_with_monotonic_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3--tale"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"rus_name": "Сказка", "name": "Tale", "summary": "S."}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3--tale/chapters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": 1, "volume": "1", "number": 1, "name": "One"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3--tale/chapter"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "id": 1, "volume": "1", "number": 1, "name": "One",
                    "attachments": [], "content": "<p>Жил-был.</p>"
                }
            })))
            .mount(&server)
            .await;

        let mut config = AppConfig::default();
        config.network.api_base = server.uri();
        config.network.site_base = server.uri();
        config.network.retry_attempts = 1;
        config.network.retry_backoff_ms = 0;

        let dir = tempfile::tempdir().unwrap();
        let progress = RecordingProgress(Mutex::new(Vec::new()));

        let epub_path = run(
            "https://ranobelib.me/ru/book/3--tale",
            dir.path(),
            &config,
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(epub_path, dir.path().join("Сказка.epub"));
        assert!(epub_path.exists());

        let seen = progress.0.lock().unwrap();
        assert!((seen[0] - 0.0).abs() < 1e-9);
        assert!((seen.last().unwrap() - 1.0).abs() < 1e-9);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[tokio::test]
    async fn metadata_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3--tale"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut config = AppConfig::default();
        config.network.api_base = server.uri();
        config.network.site_base = server.uri();
        config.network.retry_attempts = 1;
        config.network.retry_backoff_ms = 0;

        let dir = tempfile::tempdir().unwrap();
        let err = run(
            "https://ranobelib.me/ru/book/3--tale",
            dir.path(),
            &config,
            &ranopress_shared::SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("metadata"));
        assert!(!dir.path().join("ranobe.json").exists());
    }
}
