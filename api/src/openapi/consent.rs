use super::common::{
    cookie_storage, region_context, resolve_request, ApiResponse, ApiTags, ConsentRequest,
    ConsentView,
};
use crate::state::AppState;
use linkpage_common::{
    ConsentStore, CookiePreferences, PreferenceStorage, Region, ResolvedRegion, DEFAULT_REGION,
};
use poem::web::Data;
use poem::Request;
use poem_openapi::{payload::Json, OpenApi};
use std::sync::Arc;

pub struct ConsentApi;

#[OpenApi]
impl ConsentApi {
    /// Get cookie consent
    ///
    /// Stored cookie preferences and whether the consent banner should be shown
    #[oai(path = "/consent", method = "get", tag = "ApiTags::Consent")]
    async fn get_consent(
        &self,
        state: Data<&Arc<AppState>>,
        req: &Request,
    ) -> Json<ApiResponse<ConsentView>> {
        let resolved = resolve_request(state.0, req).await;
        Json(apply(state.0, req, resolved, ConsentAction::Read))
    }

    /// Save cookie consent
    ///
    /// Stores the chosen optional categories; necessary cookies are always enabled
    #[oai(path = "/consent", method = "put", tag = "ApiTags::Consent")]
    async fn save_consent(
        &self,
        state: Data<&Arc<AppState>>,
        req: &Request,
        body: Json<ConsentRequest>,
    ) -> Json<ApiResponse<ConsentView>> {
        let resolved = resolve_request(state.0, req).await;
        let preferences = CookiePreferences::from(body.0);
        Json(apply(state.0, req, resolved, ConsentAction::Save(preferences)))
    }

    /// Accept all cookies
    #[oai(path = "/consent/accept-all", method = "post", tag = "ApiTags::Consent")]
    async fn accept_all(
        &self,
        state: Data<&Arc<AppState>>,
        req: &Request,
    ) -> Json<ApiResponse<ConsentView>> {
        let resolved = resolve_request(state.0, req).await;
        Json(apply(state.0, req, resolved, ConsentAction::AcceptAll))
    }

    /// Reset cookie consent
    ///
    /// Forgets the stored decision so the banner is shown again where required
    #[oai(path = "/consent", method = "delete", tag = "ApiTags::Consent")]
    async fn reset_consent(
        &self,
        state: Data<&Arc<AppState>>,
        req: &Request,
    ) -> Json<ApiResponse<ConsentView>> {
        let resolved = resolve_request(state.0, req).await;
        Json(apply(state.0, req, resolved, ConsentAction::Reset))
    }
}

enum ConsentAction {
    Read,
    Save(CookiePreferences),
    AcceptAll,
    Reset,
}

fn apply(
    state: &AppState,
    req: &Request,
    resolved: ResolvedRegion,
    action: ConsentAction,
) -> ApiResponse<ConsentView> {
    let storage = cookie_storage(state, req.cookie());
    let region = region_context(state, &storage, resolved)
        .current_region()
        .unwrap_or(DEFAULT_REGION);
    let consent = ConsentStore::new(&storage);

    let outcome = match action {
        ConsentAction::Read => Ok(consent.load()),
        ConsentAction::Save(preferences) => consent.save(preferences),
        ConsentAction::AcceptAll => consent.accept_all(),
        ConsentAction::Reset => consent.reset(),
    };

    match outcome {
        Ok(preferences) => ApiResponse::ok(view(&consent, preferences, region)),
        Err(e) => {
            tracing::warn!(region = %region, error = %e, "Failed to store cookie consent");
            ApiResponse::err(format!("Failed to store cookie consent: {}", e))
        }
    }
}

fn view<S: PreferenceStorage>(
    consent: &ConsentStore<S>,
    preferences: CookiePreferences,
    region: Region,
) -> ConsentView {
    ConsentView::new(
        preferences,
        consent.has_consent(),
        consent.banner_visible(region),
    )
}
