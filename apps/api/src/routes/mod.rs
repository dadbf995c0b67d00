pub mod assessments;
pub mod health;
pub mod reports;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Four full-resolution photos comfortably fit; matches the 50 MB form limit of the web form.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(assessments::handle_upload_page))
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/assessments",
            post(assessments::handle_create_assessment)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/report/:run_id", get(reports::handle_report))
        .route("/report/:run_id/:file", get(reports::handle_report_file))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::assessment::artifacts::ViewPaths;
    use crate::assessment::contract::tests::conforming_response;
    use crate::assessment::exercises::RecommendationConfig;
    use crate::assessment::measurement::{ExtractionError, LandmarkExtractor};
    use crate::assessment::models::MeasurementSet;
    use crate::assessment::pipeline::Pipeline;
    use crate::assessment::prompt::PromptTemplates;
    use crate::assessment::render::HandlebarsRenderer;
    use crate::config::Config;
    use crate::llm_client::{ProviderError, ProviderRequest, SchemaEnforcement, VisionProvider};

    struct CannedProvider(String);

    #[async_trait]
    impl VisionProvider for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }
        fn model(&self) -> &str {
            "canned-1"
        }
        fn enforcement(&self) -> SchemaEnforcement {
            SchemaEnforcement::GenerationTime
        }
        async fn generate(&self, _request: &ProviderRequest) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct NoExtractor;

    #[async_trait]
    impl LandmarkExtractor for NoExtractor {
        async fn extract(
            &self,
            _images: &ViewPaths,
            _height_cm: Option<f64>,
            _output_dir: &Path,
        ) -> Result<MeasurementSet, ExtractionError> {
            Err(ExtractionError::NoJson)
        }
    }

    fn app(output: &Path, response: String) -> Router {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.output_dir = output.to_path_buf();
        let pipeline = Pipeline {
            provider: Arc::new(CannedProvider(response)),
            extractor: Arc::new(NoExtractor),
            renderer: Arc::new(HandlebarsRenderer::new(None).unwrap()),
            templates: PromptTemplates::default(),
            recommendations: RecommendationConfig::default(),
            extractor_timeout: Duration::from_secs(5),
            provider_timeout: Duration::from_secs(5),
        };
        build_router(AppState {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            shutdown: CancellationToken::new(),
        })
    }

    const BOUNDARY: &str = "posture-test-boundary";

    fn multipart(files: &[&str], fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for view in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{view}\"; filename=\"{view}_upload.png\"\r\nContent-Type: image/png\r\n\r\npixels-{view}\r\n"
            ));
        }
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/api/v1/assessments")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), String::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "canned");
    }

    #[tokio::test]
    async fn test_create_assessment_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = conforming_response("normal");
        raw["spine"]["thoracic_kyphosis"]["severity"] = "severe".into();
        let app = app(dir.path(), raw.to_string());

        let response = app
            .clone()
            .oneshot(multipart(&["front", "left", "right", "back"], &[("height", "170")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["posture_score"], 85);
        assert_eq!(body["exercises"][0]["Name"], "Thoracic Extensions");
        assert_eq!(body["warnings"], serde_json::json!([]));

        let run_id = body["run_id"].as_str().unwrap();
        assert_eq!(
            body["report_url"],
            format!("/report/{run_id}/report.html").as_str()
        );
        assert!(dir.path().join(run_id).join("front.png").is_file());

        let report = app
            .clone()
            .oneshot(
                Request::get(format!("/report/{run_id}/report.html"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(report.status(), StatusCode::OK);
        assert_eq!(
            report.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );

        let redirect = app
            .oneshot(Request::get(format!("/report/{run_id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(redirect.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_missing_view_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), "{}".to_string())
            .oneshot(multipart(&["front", "left", "right"], &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "Missing back image");
    }

    #[tokio::test]
    async fn test_rejected_upload_leaves_no_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), "{}".to_string());

        let requests = [
            multipart(&["front", "left"], &[]),
            multipart(&["front", "left", "right", "back"], &[("mode", "xray")]),
            multipart(&["front", "left", "right", "back"], &[("height", "tall")]),
        ];
        for request in requests {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_mode_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), "{}".to_string())
            .oneshot(multipart(&["front", "left", "right", "back"], &[("mode", "xray")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_response_returns_run_without_report() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), "not json".to_string())
            .oneshot(multipart(&["front", "left", "right", "back"], &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["posture_score"].is_null());
        assert!(body["report_url"].is_null());
        assert_eq!(body["warnings"][0]["kind"], "malformed_response");
    }

    #[tokio::test]
    async fn test_report_rejects_traversal_and_unknown_runs() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), String::new());

        for uri in ["/report/..%2F..%2Fetc/passwd", "/report/nope/report.html", "/report/run/..%2Fsecret"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }
}
