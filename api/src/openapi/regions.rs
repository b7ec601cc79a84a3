use super::common::{
    all_regions, cookie_storage, region_context, resolve_request, ActiveRegion, ApiResponse,
    ApiTags, CardList, RegionChange, RegionInfo, SetRegionRequest,
};
use crate::state::AppState;
use linkpage_common::{ContextError, RegionSource, ResolvedRegion};
use poem::web::Data;
use poem::Request;
use poem_openapi::{payload::Json, OpenApi};
use std::sync::Arc;

pub struct RegionsApi;

#[OpenApi]
impl RegionsApi {
    /// List regions
    ///
    /// Supported regions in display order
    #[oai(path = "/regions", method = "get", tag = "ApiTags::Regions")]
    async fn list_regions(&self) -> Json<ApiResponse<Vec<RegionInfo>>> {
        Json(ApiResponse::ok(all_regions()))
    }

    /// Select region
    ///
    /// Switches the visitor's active region and remembers the choice in a cookie.
    /// Unknown region names are rejected and change nothing.
    #[oai(path = "/region", method = "put", tag = "ApiTags::Regions")]
    async fn set_region(
        &self,
        state: Data<&Arc<AppState>>,
        req: &Request,
        body: Json<SetRegionRequest>,
    ) -> Json<ApiResponse<RegionChange>> {
        let resolved = resolve_request(state.0, req).await;
        Json(change_region(state.0, req, resolved, &body.region))
    }
}

fn change_region(
    state: &AppState,
    req: &Request,
    resolved: ResolvedRegion,
    candidate: &str,
) -> ApiResponse<RegionChange> {
    let storage = cookie_storage(state, req.cookie());
    let mut ctx = region_context(state, &storage, resolved);

    match ctx.select_region(candidate) {
        Ok(update) => {
            tracing::info!(
                previous = %update.previous,
                region = %update.region,
                persisted = update.persisted,
                "Region selected"
            );
            ApiResponse::ok(RegionChange {
                previous: update.previous.code().to_string(),
                region: ActiveRegion::new(update.region, RegionSource::UserSelection, resolved),
                persisted: update.persisted,
                cards: CardList::new(update.region, ctx.cards()),
            })
        }
        Err(e @ ContextError::UnknownRegion(_)) => {
            tracing::debug!(candidate = %candidate, "Rejected region selection");
            ApiResponse::err(e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "Region context not ready for selection");
            ApiResponse::err(e.to_string())
        }
    }
}
