//! # Model Listing Endpoint
//!
//! `GET /api/models` exposes the read-only registry: which models are
//! loaded, what kind they are, and whether they report confidence.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    let descriptors = state.registry.descriptors();
    let count = descriptors.len();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "models": descriptors,
        "count": count,
        "emotions": state.registry.labels().classes(),
        "feature_dimension": state.registry.feature_dimension()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::ModelRegistry;
    use crate::pipeline::FeatureExtractor;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn test_state() -> AppState {
        let dir = std::env::temp_dir().join(format!("models-handler-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("label_encoder.json"),
            r#"{"classes": ["angry", "happy"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("nn_scaler.json"),
            r#"{"mean": [0.0, 0.0], "scale": [1.0, 1.0]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("KNN.json"),
            r#"{
                "algorithm": "k_nearest_neighbors",
                "k": 1,
                "train_features": [[0.0, 0.0], [1.0, 1.0]],
                "train_labels": [0, 1]
            }"#,
        )
        .unwrap();

        let registry = Arc::new(ModelRegistry::load(&dir, 2).unwrap());
        std::fs::remove_dir_all(&dir).ok();

        let config = AppConfig::default();
        let extractor = Arc::new(FeatureExtractor::new(&config.extractor, 1));
        AppState::new(config, registry, extractor)
    }

    #[actix_web::test]
    async fn test_list_models_reports_registry_contents() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/api/models", web::get().to(list_models)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/models").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["count"], 1);
        assert_eq!(body["models"][0]["name"], "KNN");
        assert_eq!(body["models"][0]["kind"], "classical");
        assert_eq!(body["models"][0]["supports_probability"], true);
        assert_eq!(body["emotions"][0], "angry");
        assert_eq!(body["feature_dimension"], 2);
    }
}
