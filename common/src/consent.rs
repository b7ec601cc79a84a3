//! Cookie-consent categories and their stored form.

use crate::preferences::{PreferenceStorage, StorageError};
use crate::regions::Region;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub const COOKIE_PREFERENCES_KEY: &str = "cookie-preferences";
pub const COOKIE_CONSENT_KEY: &str = "cookie-consent";
pub const COOKIE_CONSENT_ACCEPTED: &str = "accepted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ConsentCategory {
    Necessary,
    Functional,
    Analytics,
    Marketing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookiePreferences {
    pub necessary: bool,
    pub functional: bool,
    pub analytics: bool,
    pub marketing: bool,
}

impl Default for CookiePreferences {
    fn default() -> Self {
        Self {
            necessary: true,
            functional: false,
            analytics: false,
            marketing: false,
        }
    }
}

impl CookiePreferences {
    pub fn all_accepted() -> Self {
        Self {
            necessary: true,
            functional: true,
            analytics: true,
            marketing: true,
        }
    }

    /// Parse a stored JSON object over the defaults. Unknown fields are ignored and
    /// necessary cookies stay enabled whatever the stored value says.
    pub fn from_stored(raw: &str) -> Result<Self, serde_json::Error> {
        let parsed: CookiePreferences = serde_json::from_str(raw)?;
        Ok(parsed.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        self.necessary = true;
        self
    }

    pub fn is_enabled(&self, category: ConsentCategory) -> bool {
        match category {
            ConsentCategory::Necessary => true,
            ConsentCategory::Functional => self.functional,
            ConsentCategory::Analytics => self.analytics,
            ConsentCategory::Marketing => self.marketing,
        }
    }

    /// Flip an optional category. Necessary cookies cannot be switched off.
    pub fn toggle(&mut self, category: ConsentCategory) {
        match category {
            ConsentCategory::Necessary => {}
            ConsentCategory::Functional => self.functional = !self.functional,
            ConsentCategory::Analytics => self.analytics = !self.analytics,
            ConsentCategory::Marketing => self.marketing = !self.marketing,
        }
    }
}

/// Consent state on top of a [`PreferenceStorage`].
#[derive(Debug)]
pub struct ConsentStore<S> {
    storage: S,
}

impl<S: PreferenceStorage> ConsentStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Stored preferences merged over the defaults; unreadable values yield the defaults.
    pub fn load(&self) -> CookiePreferences {
        match self.storage.get_item(COOKIE_PREFERENCES_KEY) {
            Ok(Some(raw)) => CookiePreferences::from_stored(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring corrupt cookie preferences");
                CookiePreferences::default()
            }),
            Ok(None) => CookiePreferences::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cookie preferences");
                CookiePreferences::default()
            }
        }
    }

    pub fn has_consent(&self) -> bool {
        match self.storage.get_item(COOKIE_CONSENT_KEY) {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cookie consent marker");
                false
            }
        }
    }

    /// Persist preferences and mark consent as given. Preferences are written first, so
    /// anyone who sees the consent marker also sees the preferences it refers to.
    pub fn save(&self, preferences: CookiePreferences) -> Result<CookiePreferences, StorageError> {
        let preferences = preferences.sanitized();
        let raw = serde_json::to_string(&preferences).map_err(|e| StorageError::Corrupt {
            key: COOKIE_PREFERENCES_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.storage.set_item(COOKIE_PREFERENCES_KEY, &raw)?;
        self.storage
            .set_item(COOKIE_CONSENT_KEY, COOKIE_CONSENT_ACCEPTED)?;
        Ok(preferences)
    }

    pub fn accept_all(&self) -> Result<CookiePreferences, StorageError> {
        self.save(CookiePreferences::all_accepted())
    }

    /// Forget the decision: back to defaults, banner shows again where required.
    pub fn reset(&self) -> Result<CookiePreferences, StorageError> {
        self.storage.remove_item(COOKIE_CONSENT_KEY)?;
        self.storage.remove_item(COOKIE_PREFERENCES_KEY)?;
        Ok(CookiePreferences::default())
    }

    /// Banner is shown to visitors from consent-requiring regions until they decide.
    pub fn banner_visible(&self, region: Region) -> bool {
        region.requires_cookie_consent() && !self.has_consent()
    }
}
