use crate::cookie_storage::CookieJarStorage;
use crate::resolver::RequestSignals;
use crate::state::AppState;
use linkpage_common::{
    CookiePreferences, Profile, Region, RegionContext, RegionPreferenceStore, RegionSource,
    ResolvedRegion, SelectedCard,
};
use poem::web::cookie::CookieJar;
use poem::Request;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

pub const EMPTY_CARDS_MESSAGE: &str = "No cards available for this region.";

#[derive(Debug, Serialize, Deserialize, Object)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub environment: String,
}

#[derive(Debug, Serialize, Deserialize, Object)]
#[oai(skip_serializing_if_is_none)]
pub struct ApiResponse<T: poem_openapi::types::ParseFromJSON + poem_openapi::types::ToJSON> {
    pub success: bool,
    #[oai(skip_serializing_if_is_none)]
    pub data: Option<T>,
    #[oai(skip_serializing_if_is_none)]
    pub error: Option<String>,
}

impl<T: poem_openapi::types::ParseFromJSON + poem_openapi::types::ToJSON> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct RegionInfo {
    pub code: String,
    pub display_name: String,
    pub flag: String,
    pub requires_cookie_consent: bool,
}

impl From<Region> for RegionInfo {
    fn from(region: Region) -> Self {
        Self {
            code: region.code().to_string(),
            display_name: region.display_name().to_string(),
            flag: region.flag().to_string(),
            requires_cookie_consent: region.requires_cookie_consent(),
        }
    }
}

pub fn all_regions() -> Vec<RegionInfo> {
    Region::all().into_iter().map(RegionInfo::from).collect()
}

/// What the resolver made of the request headers.
#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct ResolvedRegionInfo {
    pub region: String,
    pub provenance: String,
}

impl From<ResolvedRegion> for ResolvedRegionInfo {
    fn from(resolved: ResolvedRegion) -> Self {
        Self {
            region: resolved.region.code().to_string(),
            provenance: resolved.provenance.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct ActiveRegion {
    pub code: String,
    pub display_name: String,
    pub flag: String,
    /// `stored-preference`, `user-selection` or `resolved:<provenance>`
    pub source: String,
    pub resolved: ResolvedRegionInfo,
}

pub fn source_label(source: RegionSource) -> String {
    match source {
        RegionSource::StoredPreference => "stored-preference".to_string(),
        RegionSource::UserSelection => "user-selection".to_string(),
        RegionSource::Resolved(provenance) => format!("resolved:{}", provenance),
    }
}

impl ActiveRegion {
    pub fn new(region: Region, source: RegionSource, resolved: ResolvedRegion) -> Self {
        Self {
            code: region.code().to_string(),
            display_name: region.display_name().to_string(),
            flag: region.flag().to_string(),
            source: source_label(source),
            resolved: resolved.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct CardView {
    pub id: String,
    pub priority: i32,
    pub title: String,
    pub image: String,
    pub link: String,
}

impl From<SelectedCard> for CardView {
    fn from(card: SelectedCard) -> Self {
        Self {
            id: card.id,
            priority: card.priority,
            title: card.content.title,
            image: card.content.image,
            link: card.content.link,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct CardList {
    pub region: String,
    pub cards: Vec<CardView>,
    #[oai(skip_serializing_if_is_none)]
    pub empty_message: Option<String>,
}

impl CardList {
    pub fn new(region: Region, cards: Vec<SelectedCard>) -> Self {
        let empty_message = cards
            .is_empty()
            .then(|| EMPTY_CARDS_MESSAGE.to_string());
        Self {
            region: region.code().to_string(),
            cards: cards.into_iter().map(CardView::from).collect(),
            empty_message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct SocialLinkView {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct ProfileView {
    pub name: String,
    pub description: String,
    pub image: String,
    pub social_links: Vec<SocialLinkView>,
}

impl From<&Profile> for ProfileView {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            description: profile.description.clone(),
            image: profile.image.clone(),
            social_links: profile
                .social_links
                .iter()
                .map(|link| SocialLinkView {
                    platform: link.platform.to_string(),
                    url: link.url.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct ConsentView {
    pub necessary: bool,
    pub functional: bool,
    pub analytics: bool,
    pub marketing: bool,
    pub consent_given: bool,
    pub banner_visible: bool,
}

impl ConsentView {
    pub fn new(preferences: CookiePreferences, consent_given: bool, banner_visible: bool) -> Self {
        Self {
            necessary: preferences.necessary,
            functional: preferences.functional,
            analytics: preferences.analytics,
            marketing: preferences.marketing,
            consent_given,
            banner_visible,
        }
    }
}

/// Everything the link page renders in one response.
#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct PageView {
    pub profile: ProfileView,
    pub region: ActiveRegion,
    pub cards: CardList,
    pub consent: ConsentView,
    pub regions: Vec<RegionInfo>,
}

#[derive(Debug, Deserialize, Object)]
pub struct SetRegionRequest {
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct RegionChange {
    pub previous: String,
    pub region: ActiveRegion,
    /// False when the browser-side preference could not be written.
    pub persisted: bool,
    pub cards: CardList,
}

/// Cookie categories the visitor opted into. `necessary` is always on and not accepted here.
#[derive(Debug, Deserialize, Object)]
pub struct ConsentRequest {
    #[oai(default)]
    pub functional: bool,
    #[oai(default)]
    pub analytics: bool,
    #[oai(default)]
    pub marketing: bool,
}

impl From<ConsentRequest> for CookiePreferences {
    fn from(req: ConsentRequest) -> Self {
        CookiePreferences {
            necessary: true,
            functional: req.functional,
            analytics: req.analytics,
            marketing: req.marketing,
        }
    }
}

/// Server-side region guess from the request headers.
pub async fn resolve_request(state: &AppState, req: &Request) -> ResolvedRegion {
    state
        .resolver
        .resolve(&RequestSignals::from_headers(req.headers()))
        .await
}

/// Per-request storage over the visitor's cookies.
pub fn cookie_storage<'a>(state: &AppState, cookie_jar: &'a CookieJar) -> CookieJarStorage<'a> {
    CookieJarStorage::new(cookie_jar, state.config.secure_cookies)
}

/// Region context for one request, reconciled against the cookie preference.
///
/// The context is not `Send`, so build it after the last `.await` of a handler.
pub fn region_context<'a>(
    state: &AppState,
    storage: &'a CookieJarStorage<'a>,
    resolved: ResolvedRegion,
) -> RegionContext<&'a CookieJarStorage<'a>> {
    RegionContext::initialize(
        state.catalog.clone(),
        RegionPreferenceStore::new(storage),
        resolved,
    )
}

#[derive(poem_openapi::Tags)]
pub enum ApiTags {
    /// System endpoints
    System,
    /// Link page aggregate
    Page,
    /// Region catalog and region selection
    Regions,
    /// Region-specific content cards
    Cards,
    /// Cookie consent preferences
    Consent,
}
