//! Supported market regions and country/language-to-region mapping.
//!
//! Provides:
//! - `Region`: The closed set of regions content varies by
//! - `country_code_to_region()`: Maps ISO 3166-1 alpha-2 country codes to regions
//! - `language_to_region()`: Maps bare language codes to regions
//! - `is_valid_region()` / `normalize_region()`: Validation of untrusted region strings
//! - `ResolvedRegion` / `Provenance`: Resolver output handed to the region context

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Region used whenever nothing better is known.
pub const DEFAULT_REGION: Region = Region::Usa;

/// Geo-header values that mean "country unknown" rather than a real country.
pub const UNKNOWN_COUNTRY_SENTINELS: &[&str] = &["XX", "T1"];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    AsRefStr,
    IntoStaticStr,
)]
pub enum Region {
    #[strum(serialize = "USA")]
    #[serde(rename = "USA")]
    Usa,
    #[strum(serialize = "Canada")]
    #[serde(rename = "Canada")]
    Canada,
    #[strum(serialize = "UK")]
    #[serde(rename = "UK")]
    Uk,
    #[strum(serialize = "Germany")]
    #[serde(rename = "Germany")]
    Germany,
    #[strum(serialize = "France")]
    #[serde(rename = "France")]
    France,
}

impl Region {
    /// All regions in display order.
    pub fn all() -> Vec<Region> {
        Region::iter().collect()
    }

    /// Canonical identifier, e.g. "USA". Same string the region is stored under.
    pub fn code(&self) -> &'static str {
        self.into()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Region::Usa => "United States",
            Region::Canada => "Canada",
            Region::Uk => "United Kingdom",
            Region::Germany => "Germany",
            Region::France => "France",
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            Region::Usa => "🇺🇸",
            Region::Canada => "🇨🇦",
            Region::Uk => "🇬🇧",
            Region::Germany => "🇩🇪",
            Region::France => "🇫🇷",
        }
    }

    /// ISO 3166-1 alpha-2 codes that resolve to this region.
    pub fn country_codes(&self) -> &'static [&'static str] {
        match self {
            Region::Usa => &["US"],
            Region::Canada => &["CA"],
            Region::Uk => &["GB"],
            Region::Germany => &["DE"],
            Region::France => &["FR"],
        }
    }

    /// European visitors must be asked for cookie consent before optional cookies are set.
    pub fn requires_cookie_consent(&self) -> bool {
        matches!(self, Region::Uk | Region::Germany | Region::France)
    }
}

/// Check if a region identifier is valid. Case-sensitive, never panics.
pub fn is_valid_region(candidate: &str) -> bool {
    Region::from_str(candidate).is_ok()
}

/// Parse an untrusted region string, falling back to [`DEFAULT_REGION`].
pub fn normalize_region(candidate: Option<&str>) -> Region {
    candidate
        .and_then(|c| Region::from_str(c).ok())
        .unwrap_or(DEFAULT_REGION)
}

/// Map an ISO 3166-1 alpha-2 country code to a supported region.
///
/// Returns `None` for codes outside the supported set.
pub fn country_code_to_region(country: &str) -> Option<Region> {
    match country.trim().to_uppercase().as_str() {
        "US" => Some(Region::Usa),
        "CA" => Some(Region::Canada),
        "GB" => Some(Region::Uk),
        "DE" => Some(Region::Germany),
        "FR" => Some(Region::France),
        _ => None,
    }
}

/// Map a bare language code (no region subtag) to the region most of its speakers are served from.
pub fn language_to_region(language: &str) -> Option<Region> {
    match language.trim().to_lowercase().as_str() {
        "de" => Some(Region::Germany),
        "fr" => Some(Region::France),
        // English defaults to USA; en-GB/en-CA are caught by the subtag match first
        "en" => Some(Region::Usa),
        _ => None,
    }
}

/// Validate a country code against ISO 3166-1 alpha-2 format.
pub fn is_valid_country_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Which resolver tier produced a region.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Provenance {
    EdgeGeoHeader,
    PlatformGeoHeader,
    IpGeolocation,
    LanguageHeader,
    Default,
}

/// Server-side best guess for a visitor's region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRegion {
    pub region: Region,
    pub provenance: Provenance,
}

impl ResolvedRegion {
    pub fn new(region: Region, provenance: Provenance) -> Self {
        Self { region, provenance }
    }

    pub fn fallback() -> Self {
        Self::new(DEFAULT_REGION, Provenance::Default)
    }
}
