use super::common::{ApiTags, HealthResponse};
use crate::state::AppState;
use poem::web::Data;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;
use std::sync::Arc;

pub struct SystemApi;

#[OpenApi]
impl SystemApi {
    /// Health check endpoint
    ///
    /// Returns the health status of the API server
    #[oai(path = "/health", method = "get", tag = "ApiTags::System")]
    async fn health(&self, state: Data<&Arc<AppState>>) -> Json<HealthResponse> {
        Json(HealthResponse {
            success: true,
            message: "Link page API is running".to_string(),
            environment: state.config.environment.clone(),
        })
    }
}
