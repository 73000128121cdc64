/// HTTP API поверх конвейера

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::Method,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::pipeline::CreditPipeline;
use crate::types::{ApplicationRecord, ModelInfo, PredictionResult, TrainingResult};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<CreditPipeline>,
}

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub records: Vec<ApplicationRecord>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "api".to_string()
}

pub fn router(pipeline: Arc<CreditPipeline>) -> Router {
    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/predict", post(predict))
        .route("/api/train", post(train))
        .route("/api/model-info", get(model_info))
        .layer(cors)
        .with_state(AppState { pipeline })
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Credit ML API (Rust)",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "models_loaded": state.pipeline.has_models()
    }))
}

async fn predict(
    State(state): State<AppState>,
    Json(record): Json<ApplicationRecord>,
) -> Json<PredictionResult> {
    tracing::debug!("Predict request: {} fields", record.len());
    Json(state.pipeline.predict(&record))
}

/// Обучение идет в пуле блокирующих задач. Крайний срок проверяет сама
/// задача перед фиксацией, поэтому ответ совпадает с тем, что установлено:
/// просроченный запуск возвращает неудачу и активная модель остается прежней
async fn train(
    State(state): State<AppState>,
    Json(request): Json<TrainRequest>,
) -> Json<TrainingResult> {
    let records_count = request.records.len();
    tracing::info!("Train request: {} records from {}", records_count, request.source);

    let deadline = Instant::now() + state.pipeline.config().training_timeout;
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::task::spawn_blocking(move || {
        pipeline.train_until(&request.records, &request.source, deadline)
    });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Training task failed: {}", e);
            TrainingResult::failure(format!("Training task failed: {}", e), records_count)
        }
    };
    Json(result)
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.pipeline.model_info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::sample_data;
    use axum::body::{to_bytes, Body};
    use std::time::Duration;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn config(name: &str) -> PipelineConfig {
        let dir = std::env::temp_dir().join(format!("credit-ml-api-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        PipelineConfig {
            weights_dir: dir.join("weights"),
            data_dir: dir.join("data"),
            ..PipelineConfig::default()
        }
    }

    fn app(name: &str) -> Router {
        router(Arc::new(CreditPipeline::open(config(name))))
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_missing_models() {
        let response = app("health")
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models_loaded"], false);
    }

    #[tokio::test]
    async fn predict_falls_back_to_rules() {
        let request = post_json(
            "/api/predict",
            serde_json::json!({
                "Credit_Score": 780,
                "DTI_Ratio": 0.25,
                "Monthly_Income": 70000,
                "Employment_Duration_Months": 48,
                "completeness_score": 95
            }),
        );
        let response = app("predict").oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let result: PredictionResult = json_body(response).await;
        assert_eq!(result.success_probability, 75.0);
        assert_eq!(result.completeness_score, 95.0);
        assert!((0.0..=100.0).contains(&result.withdrawal_risk));
    }

    #[tokio::test]
    async fn predict_accepts_null_fields() {
        let request = post_json(
            "/api/predict",
            serde_json::json!({ "Age": null, "Credit_Score": 780, "Gender": null }),
        );
        let response = app("predict-null").oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let result: PredictionResult = json_body(response).await;
        assert!((0.0..=100.0).contains(&result.success_probability));
    }

    #[tokio::test]
    async fn train_without_status_reports_failure() {
        let request = post_json(
            "/api/train",
            serde_json::json!({ "records": [{ "Credit_Score": 700 }], "source": "upload" }),
        );
        let response = app("train").oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let result: TrainingResult = json_body(response).await;
        assert!(!result.success);
        assert_eq!(result.records_used, 1);
    }

    #[tokio::test]
    async fn expired_training_reports_failure_and_installs_nothing() {
        let config = PipelineConfig {
            training_timeout: Duration::ZERO,
            ..config("expired")
        };
        let pipeline = Arc::new(CreditPipeline::open(config));
        let app = router(Arc::clone(&pipeline));

        let records = sample_data::generate_applications(40, 3);
        let request = post_json(
            "/api/train",
            serde_json::json!({ "records": records, "source": "upload" }),
        );
        let response = app.oneshot(request).await.unwrap();

        let result: TrainingResult = json_body(response).await;
        assert!(!result.success);
        assert_eq!(result.message, "Training timed out");
        // ответ и состояние согласованы: модель не появилась
        assert!(!pipeline.has_models());
        assert!(pipeline.model_info().training_history.is_empty());
    }

    #[tokio::test]
    async fn model_info_is_empty_before_training() {
        let response = app("info")
            .oneshot(Request::builder().uri("/api/model-info").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let info: ModelInfo = json_body(response).await;
        assert!(info.models_loaded.is_empty());
        assert_eq!(info.current_version, None);
        assert!(info.training_history.is_empty());
    }
}
