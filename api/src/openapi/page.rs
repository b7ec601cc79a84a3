use super::common::{
    all_regions, cookie_storage, region_context, resolve_request, ActiveRegion, ApiResponse,
    ApiTags, CardList, ConsentView, PageView, ProfileView,
};
use crate::state::AppState;
use linkpage_common::{ConsentStore, DEFAULT_REGION, RegionSource, ResolvedRegion};
use poem::web::Data;
use poem::Request;
use poem_openapi::{payload::Json, OpenApi};
use std::sync::Arc;

pub struct PageApi;

#[OpenApi]
impl PageApi {
    /// Link page
    ///
    /// Profile header, active region with its source, the region's ordered cards,
    /// cookie banner state and the region picker options
    #[oai(path = "/page", method = "get", tag = "ApiTags::Page")]
    async fn page(&self, state: Data<&Arc<AppState>>, req: &Request) -> Json<ApiResponse<PageView>> {
        let resolved = resolve_request(state.0, req).await;
        Json(ApiResponse::ok(build_page(state.0, req, resolved)))
    }
}

fn build_page(state: &AppState, req: &Request, resolved: ResolvedRegion) -> PageView {
    let storage = cookie_storage(state, req.cookie());
    let ctx = region_context(state, &storage, resolved);
    let region = ctx.current_region().unwrap_or(DEFAULT_REGION);
    let source = ctx.source().unwrap_or(RegionSource::Resolved(resolved.provenance));

    let consent = ConsentStore::new(&storage);
    let consent_view = ConsentView::new(
        consent.load(),
        consent.has_consent(),
        consent.banner_visible(region),
    );

    tracing::debug!(
        region = %region,
        source = ?source,
        banner = consent_view.banner_visible,
        "Rendering link page"
    );

    PageView {
        profile: ProfileView::from(&state.profile),
        region: ActiveRegion::new(region, source, resolved),
        cards: CardList::new(region, ctx.cards()),
        consent: consent_view,
        regions: all_regions(),
    }
}
