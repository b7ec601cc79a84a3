use super::common::{
    cookie_storage, region_context, resolve_request, ApiResponse, ApiTags, CardList, CardView,
};
use crate::state::AppState;
use linkpage_common::{normalize_region, Region, ResolvedRegion, SelectedCard, DEFAULT_REGION};
use poem::web::Data;
use poem::Request;
use poem_openapi::{
    param::{Path, Query},
    payload::Json,
    OpenApi,
};
use std::sync::Arc;

pub struct CardsApi;

#[OpenApi]
impl CardsApi {
    /// List cards for a region
    ///
    /// Cards ordered by priority. Without `region` the visitor's active region is used;
    /// unknown region names fall back to the default region.
    #[oai(path = "/cards", method = "get", tag = "ApiTags::Cards")]
    async fn list_cards(
        &self,
        state: Data<&Arc<AppState>>,
        req: &Request,
        region: Query<Option<String>>,
    ) -> Json<ApiResponse<CardList>> {
        let region = requested_region(state.0, req, region.0.as_deref()).await;
        Json(ApiResponse::ok(CardList::new(
            region,
            state.catalog.cards_for_region(region),
        )))
    }

    /// Get one card
    ///
    /// Content of a card in a region. Without `region` the visitor's active region is used;
    /// unknown region names fall back to the default region.
    #[oai(path = "/cards/:id", method = "get", tag = "ApiTags::Cards")]
    async fn get_card(
        &self,
        state: Data<&Arc<AppState>>,
        req: &Request,
        id: Path<String>,
        region: Query<Option<String>>,
    ) -> Json<ApiResponse<CardView>> {
        let region = requested_region(state.0, req, region.0.as_deref()).await;
        let Some(card) = state.catalog.cards().iter().find(|card| card.id == id.0) else {
            return Json(ApiResponse::err(format!("Card not found: {}", id.0)));
        };
        match state.catalog.card_content(&id.0, region) {
            Some(content) => Json(ApiResponse::ok(CardView::from(SelectedCard {
                id: card.id.clone(),
                priority: card.priority,
                content,
            }))),
            None => Json(ApiResponse::err(format!(
                "Card {} is not shown in {}",
                id.0, region
            ))),
        }
    }
}

/// Explicit `region` query value, normalized, or the visitor's active region.
async fn requested_region(state: &AppState, req: &Request, query: Option<&str>) -> Region {
    match query {
        Some(candidate) => normalize_region(Some(candidate)),
        None => {
            let resolved = resolve_request(state, req).await;
            active_region(state, req, resolved)
        }
    }
}

fn active_region(state: &AppState, req: &Request, resolved: ResolvedRegion) -> Region {
    let storage = cookie_storage(state, req.cookie());
    region_context(state, &storage, resolved)
        .current_region()
        .unwrap_or(DEFAULT_REGION)
}
