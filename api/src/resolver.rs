//! Server-side region resolution from request signals.
//!
//! Tiers, first match wins:
//! 1. Edge geo header (`cf-ipcountry`)
//! 2. Platform geo header (`x-vercel-ip-country`)
//! 3. IP geolocation lookup for public client IPs
//! 4. `accept-language` region subtags, then bare languages
//! 5. Default region
//!
//! Every tier returns `Option<Region>`; absent or invalid signals are "no match" and
//! resolution always produces a region.

use crate::geolocation::GeoLocator;
use linkpage_common::{
    country_code_to_region, language_to_region, Provenance, Region, ResolvedRegion,
    UNKNOWN_COUNTRY_SENTINELS,
};
use poem::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

pub const EDGE_COUNTRY_HEADER: &str = "cf-ipcountry";
pub const PLATFORM_COUNTRY_HEADER: &str = "x-vercel-ip-country";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";
pub const CDN_CLIENT_IP_HEADER: &str = "cf-connecting-ip";
pub const ACCEPT_LANGUAGE_HEADER: &str = "accept-language";

/// Request headers relevant to region resolution. Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    pub edge_country: Option<String>,
    pub platform_country: Option<String>,
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub cdn_client_ip: Option<String>,
    pub accept_language: Option<String>,
}

impl RequestSignals {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            edge_country: get(EDGE_COUNTRY_HEADER),
            platform_country: get(PLATFORM_COUNTRY_HEADER),
            forwarded_for: get(FORWARDED_FOR_HEADER),
            real_ip: get(REAL_IP_HEADER),
            cdn_client_ip: get(CDN_CLIENT_IP_HEADER),
            accept_language: get(ACCEPT_LANGUAGE_HEADER),
        }
    }

    /// Client IP from the first non-empty forwarding header.
    pub fn client_ip(&self) -> Option<IpAddr> {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|list| list.split(',').map(str::trim).find(|s| !s.is_empty()));
        let raw = forwarded
            .or(self.real_ip.as_deref())
            .or(self.cdn_client_ip.as_deref())?;
        parse_ip(raw)
    }
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// Whether an address may be sent to an external geolocation service.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_ipv4(v4),
        // covers both v4-mapped (::ffff:a.b.c.d) and v4-compatible (::a.b.c.d) forms
        IpAddr::V6(v6) => match v6.to_ipv4() {
            Some(v4) => is_public_ipv4(v4),
            None => is_public_ipv6(v6),
        },
    }
}

fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    let this_network = octets[0] == 0;
    let carrier_grade_nat = octets[0] == 100 && (octets[1] & 0xc0) == 64;
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || this_network
        || carrier_grade_nat)
}

fn is_public_ipv6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();
    let unique_local = (segments[0] & 0xfe00) == 0xfc00;
    let link_local = (segments[0] & 0xffc0) == 0xfe80;
    let documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation)
}

/// Country header tiers: sentinel "unknown country" values never match.
pub fn match_country_header(value: Option<&str>) -> Option<Region> {
    let code = value?.trim().to_uppercase();
    if UNKNOWN_COUNTRY_SENTINELS.contains(&code.as_str()) {
        return None;
    }
    country_code_to_region(&code)
}

/// Which part of an `accept-language` tag matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageMatch {
    RegionSubtag(Region),
    Language(Region),
}

impl LanguageMatch {
    pub fn region(&self) -> Region {
        match self {
            LanguageMatch::RegionSubtag(region) | LanguageMatch::Language(region) => *region,
        }
    }
}

/// Walk `accept-language` tags in header order. For each tag the region subtag is tried
/// first, then the bare language, before moving on to the next tag.
pub fn match_accept_language(header: Option<&str>) -> Option<LanguageMatch> {
    let header = header?.to_lowercase();
    for entry in header.split(',') {
        let tag = entry.split(';').next().unwrap_or("").trim();
        if tag.is_empty() || tag == "*" {
            continue;
        }
        let mut subtags = tag.split(['-', '_']);
        let language = subtags.next().unwrap_or("");

        let region_subtag = subtags
            .find(|s| s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()));
        if let Some(region) = region_subtag.and_then(country_code_to_region) {
            return Some(LanguageMatch::RegionSubtag(region));
        }
        if let Some(region) = language_to_region(language) {
            return Some(LanguageMatch::Language(region));
        }
    }
    None
}

pub struct RegionResolver {
    geo: Option<Arc<dyn GeoLocator>>,
    lookup_timeout: Duration,
    verbose: bool,
}

impl std::fmt::Debug for RegionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionResolver")
            .field("geo", &self.geo.as_ref().map(|g| g.name()))
            .field("lookup_timeout", &self.lookup_timeout)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Log a resolution step at info in development mode, debug otherwise.
macro_rules! trace_step {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

impl RegionResolver {
    pub fn new(geo: Option<Arc<dyn GeoLocator>>, lookup_timeout: Duration, verbose: bool) -> Self {
        Self {
            geo,
            lookup_timeout,
            verbose,
        }
    }

    /// Resolve a region. Never fails: each tier degrades to the next one.
    pub async fn resolve(&self, signals: &RequestSignals) -> ResolvedRegion {
        trace_step!(
            self.verbose,
            edge = ?signals.edge_country,
            platform = ?signals.platform_country,
            accept_language = ?signals.accept_language,
            forwarded_for = ?signals.forwarded_for,
            "Resolving region"
        );

        if let Some(region) = match_country_header(signals.edge_country.as_deref()) {
            trace_step!(self.verbose, region = %region, "Region from edge geo header");
            return ResolvedRegion::new(region, Provenance::EdgeGeoHeader);
        }

        if let Some(region) = match_country_header(signals.platform_country.as_deref()) {
            trace_step!(self.verbose, region = %region, "Region from platform geo header");
            return ResolvedRegion::new(region, Provenance::PlatformGeoHeader);
        }

        if let Some(region) = self.lookup_ip(signals).await {
            trace_step!(self.verbose, region = %region, "Region from IP geolocation");
            return ResolvedRegion::new(region, Provenance::IpGeolocation);
        }

        if let Some(found) = match_accept_language(signals.accept_language.as_deref()) {
            trace_step!(
                self.verbose,
                region = %found.region(),
                matched = ?found,
                "Region from accept-language"
            );
            return ResolvedRegion::new(found.region(), Provenance::LanguageHeader);
        }

        trace_step!(self.verbose, "No region signal matched, using default");
        ResolvedRegion::fallback()
    }

    async fn lookup_ip(&self, signals: &RequestSignals) -> Option<Region> {
        let geo = self.geo.as_ref()?;
        let ip = signals.client_ip()?;
        if !is_public_ip(ip) {
            trace_step!(self.verbose, ip = %ip, "Skipping geolocation for non-public IP");
            return None;
        }

        let country = match tokio::time::timeout(self.lookup_timeout, geo.country_code(ip)).await
        {
            Ok(Ok(country)) => country?,
            Ok(Err(e)) => {
                tracing::warn!(ip = %ip, provider = geo.name(), "Geolocation lookup failed: {:#}", e);
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    ip = %ip,
                    provider = geo.name(),
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Geolocation lookup timed out"
                );
                return None;
            }
        };
        let region = country_code_to_region(&country);
        if region.is_none() {
            trace_step!(self.verbose, ip = %ip, country = %country, "Geolocated country not supported");
        }
        region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::tests::StubLocator;
    use poem::http::HeaderValue;

    fn signals() -> RequestSignals {
        RequestSignals::default()
    }

    fn resolver_without_geo() -> RegionResolver {
        RegionResolver::new(None, Duration::from_millis(200), false)
    }

    fn resolver_with(stub: Arc<StubLocator>) -> RegionResolver {
        RegionResolver::new(Some(stub), Duration::from_millis(200), true)
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(EDGE_COUNTRY_HEADER, HeaderValue::from_static(" de "));
        headers.insert(PLATFORM_COUNTRY_HEADER, HeaderValue::from_static(""));
        headers.insert(ACCEPT_LANGUAGE_HEADER, HeaderValue::from_static("fr-FR"));
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("8.8.8.8, 10.0.0.1"));

        let s = RequestSignals::from_headers(&headers);
        assert_eq!(s.edge_country.as_deref(), Some("de"));
        assert_eq!(s.platform_country, None);
        assert_eq!(s.accept_language.as_deref(), Some("fr-FR"));
        assert_eq!(s.real_ip, None);
        assert_eq!(s.client_ip(), Some("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut s = signals();
        assert_eq!(s.client_ip(), None);

        s.cdn_client_ip = Some("1.1.1.1".to_string());
        assert_eq!(s.client_ip(), Some("1.1.1.1".parse().unwrap()));

        s.real_ip = Some("9.9.9.9".to_string());
        assert_eq!(s.client_ip(), Some("9.9.9.9".parse().unwrap()));

        s.forwarded_for = Some(" , 8.8.4.4:443, 1.2.3.4".to_string());
        assert_eq!(s.client_ip(), Some("8.8.4.4".parse().unwrap()));

        s.forwarded_for = Some("[2001:4860::8888]:80".to_string());
        assert_eq!(s.client_ip(), Some("2001:4860::8888".parse().unwrap()));

        s.forwarded_for = Some("unknown".to_string());
        assert_eq!(s.client_ip(), None);
    }

    #[test]
    fn test_is_public_ip() {
        for private in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.1.1",
            "100.64.0.1",
            "0.0.0.0",
            "255.255.255.255",
            "::1",
            "::",
            "fd00::1",
            "fe80::1",
            "::ffff:192.168.0.1",
            "224.0.0.1",
            "239.255.255.250",
            "192.0.2.1",
            "198.51.100.7",
            "203.0.113.9",
            "0.1.2.3",
            "2001:db8::1",
            "ff02::1",
            "::127.0.0.1",
            "::10.0.0.1",
        ] {
            assert!(!is_public_ip(private.parse().unwrap()), "{}", private);
        }
        for public in [
            "8.8.8.8",
            "81.2.69.160",
            "100.128.0.1",
            "2001:4860::8888",
            "2001:db9::1",
            "::ffff:8.8.8.8",
        ] {
            assert!(is_public_ip(public.parse().unwrap()), "{}", public);
        }
    }

    #[test]
    fn test_match_country_header() {
        assert_eq!(match_country_header(Some("DE")), Some(Region::Germany));
        assert_eq!(match_country_header(Some("gb")), Some(Region::Uk));
        assert_eq!(match_country_header(Some("XX")), None);
        assert_eq!(match_country_header(Some("T1")), None);
        assert_eq!(match_country_header(Some("t1")), None);
        assert_eq!(match_country_header(Some("MX")), None);
        assert_eq!(match_country_header(None), None);
    }

    #[test]
    fn test_match_accept_language() {
        assert_eq!(
            match_accept_language(Some("fr-FR,en;q=0.8")),
            Some(LanguageMatch::RegionSubtag(Region::France))
        );
        assert_eq!(
            match_accept_language(Some("en-GB,en;q=0.9")),
            Some(LanguageMatch::RegionSubtag(Region::Uk))
        );
        assert_eq!(
            match_accept_language(Some("de")),
            Some(LanguageMatch::Language(Region::Germany))
        );
        assert_eq!(match_accept_language(Some("es-MX")), None);
        assert_eq!(match_accept_language(Some("*")), None);
        assert_eq!(match_accept_language(Some("")), None);
        assert_eq!(match_accept_language(None), None);
    }

    #[test]
    fn test_accept_language_same_tag_language_before_next_tag() {
        // fr-BE: region subtag unsupported, bare "fr" wins before the en-CA tag is looked at
        assert_eq!(
            match_accept_language(Some("fr-BE, en-CA;q=0.5")),
            Some(LanguageMatch::Language(Region::France))
        );
        // es-MX has neither a supported subtag nor language, so the next tag decides
        assert_eq!(
            match_accept_language(Some("es-MX,en-CA;q=0.5")),
            Some(LanguageMatch::RegionSubtag(Region::Canada))
        );
    }

    #[test]
    fn test_accept_language_script_and_underscore_subtags() {
        assert_eq!(
            match_accept_language(Some("zh-Hant-CA")),
            Some(LanguageMatch::RegionSubtag(Region::Canada))
        );
        assert_eq!(
            match_accept_language(Some("en_US")),
            Some(LanguageMatch::RegionSubtag(Region::Usa))
        );
    }

    #[tokio::test]
    async fn test_edge_header_scenario() {
        let mut s = signals();
        s.edge_country = Some("DE".to_string());
        assert_eq!(
            resolver_without_geo().resolve(&s).await,
            ResolvedRegion::new(Region::Germany, Provenance::EdgeGeoHeader)
        );
    }

    #[tokio::test]
    async fn test_accept_language_locale_scenario() {
        let mut s = signals();
        s.accept_language = Some("fr-FR,en;q=0.8".to_string());
        assert_eq!(
            resolver_without_geo().resolve(&s).await,
            ResolvedRegion::new(Region::France, Provenance::LanguageHeader)
        );
    }

    #[tokio::test]
    async fn test_unsupported_language_scenario_uses_default() {
        let mut s = signals();
        s.accept_language = Some("es-MX".to_string());
        s.forwarded_for = Some("8.8.8.8".to_string());

        let stub = Arc::new(StubLocator::failing());
        let resolved = resolver_with(stub.clone()).resolve(&s).await;
        assert_eq!(resolved, ResolvedRegion::new(Region::Usa, Provenance::Default));
        assert_eq!(stub.calls(), 1);

        assert_eq!(resolver_without_geo().resolve(&s).await, resolved);
    }

    #[tokio::test]
    async fn test_edge_header_wins_over_everything() {
        let mut s = signals();
        s.edge_country = Some("CA".to_string());
        s.platform_country = Some("GB".to_string());
        s.forwarded_for = Some("8.8.8.8".to_string());
        s.accept_language = Some("de-DE".to_string());

        let stub = Arc::new(StubLocator::answering("8.8.8.8", Some("FR")));
        let resolved = resolver_with(stub.clone()).resolve(&s).await;
        assert_eq!(resolved, ResolvedRegion::new(Region::Canada, Provenance::EdgeGeoHeader));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_sentinel_falls_through_to_platform_header() {
        for sentinel in ["XX", "T1"] {
            let mut s = signals();
            s.edge_country = Some(sentinel.to_string());
            s.platform_country = Some("GB".to_string());
            assert_eq!(
                resolver_without_geo().resolve(&s).await,
                ResolvedRegion::new(Region::Uk, Provenance::PlatformGeoHeader)
            );
        }
    }

    #[tokio::test]
    async fn test_sentinel_alone_resolves_to_default() {
        let mut s = signals();
        s.edge_country = Some("XX".to_string());
        assert_eq!(resolver_without_geo().resolve(&s).await, ResolvedRegion::fallback());
    }

    #[tokio::test]
    async fn test_unsupported_edge_country_falls_through() {
        let mut s = signals();
        s.edge_country = Some("JP".to_string());
        s.accept_language = Some("de".to_string());
        assert_eq!(
            resolver_without_geo().resolve(&s).await,
            ResolvedRegion::new(Region::Germany, Provenance::LanguageHeader)
        );
    }

    #[tokio::test]
    async fn test_ip_geolocation_tier() {
        let mut s = signals();
        s.real_ip = Some("81.2.69.160".to_string());
        s.accept_language = Some("de-DE".to_string());

        let stub = Arc::new(StubLocator::answering("81.2.69.160", Some("GB")));
        assert_eq!(
            resolver_with(stub.clone()).resolve(&s).await,
            ResolvedRegion::new(Region::Uk, Provenance::IpGeolocation)
        );
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_ip_geolocation_unsupported_country_falls_through() {
        let mut s = signals();
        s.real_ip = Some("8.8.8.8".to_string());
        s.accept_language = Some("fr".to_string());

        let stub = Arc::new(StubLocator::answering("8.8.8.8", Some("BR")));
        assert_eq!(
            resolver_with(stub).resolve(&s).await,
            ResolvedRegion::new(Region::France, Provenance::LanguageHeader)
        );
    }

    #[tokio::test]
    async fn test_private_ip_skips_geolocation() {
        let mut s = signals();
        s.forwarded_for = Some("192.168.1.20".to_string());
        s.accept_language = Some("en-CA".to_string());

        let stub = Arc::new(StubLocator::answering("192.168.1.20", Some("DE")));
        assert_eq!(
            resolver_with(stub.clone()).resolve(&s).await,
            ResolvedRegion::new(Region::Canada, Provenance::LanguageHeader)
        );
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_geolocation_timeout_falls_through() {
        let mut s = signals();
        s.forwarded_for = Some("8.8.8.8".to_string());
        s.accept_language = Some("de".to_string());

        let mut stub = StubLocator::answering("8.8.8.8", Some("US"));
        stub.delay = Some(Duration::from_secs(5));
        let resolver = RegionResolver::new(Some(Arc::new(stub)), Duration::from_millis(50), false);

        let started = std::time::Instant::now();
        let resolved = resolver.resolve(&s).await;
        assert_eq!(resolved, ResolvedRegion::new(Region::Germany, Provenance::LanguageHeader));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let mut s = signals();
        s.platform_country = Some("ZZ".to_string());
        s.accept_language = Some("en-US,en;q=0.9,de;q=0.8".to_string());

        let resolver = resolver_without_geo();
        let first = resolver.resolve(&s).await;
        for _ in 0..10 {
            assert_eq!(resolver.resolve(&s).await, first);
        }
        assert_eq!(first, ResolvedRegion::new(Region::Usa, Provenance::LanguageHeader));
    }

    #[tokio::test]
    async fn test_no_signals_default() {
        assert_eq!(
            resolver_without_geo().resolve(&signals()).await,
            ResolvedRegion::fallback()
        );
    }
}
