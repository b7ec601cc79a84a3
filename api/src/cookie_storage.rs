// Preference storage backed by browser cookies, one cookie per key.

use linkpage_common::{PreferenceStorage, StorageError};
use poem::web::cookie::{Cookie, CookieJar, SameSite};
use std::time::Duration;

/// Browsers cap cookie lifetime at 400 days.
const COOKIE_MAX_AGE: Duration = Duration::from_secs(400 * 24 * 60 * 60);
/// Largest `Set-Cookie` value (encoded name, value and attributes) browsers accept.
pub const COOKIE_SIZE_LIMIT: usize = 4096;

pub struct CookieJarStorage<'a> {
    jar: &'a CookieJar,
    secure: bool,
}

impl<'a> CookieJarStorage<'a> {
    pub fn new(jar: &'a CookieJar, secure: bool) -> Self {
        Self { jar, secure }
    }

    fn cookie(&self, key: &str, value: &str, max_age: Duration) -> Cookie {
        let mut cookie = Cookie::new_with_str(key, value);
        cookie.set_path("/");
        cookie.set_same_site(Some(SameSite::Lax));
        cookie.set_secure(self.secure);
        cookie.set_max_age(max_age);
        cookie
    }
}

impl std::fmt::Debug for CookieJarStorage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJarStorage")
            .field("secure", &self.secure)
            .finish()
    }
}

impl PreferenceStorage for CookieJarStorage<'_> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        // cleared cookies come back empty until the browser drops them
        Ok(self
            .jar
            .get(key)
            .map(|cookie| cookie.value_str().to_string())
            .filter(|value| !value.is_empty()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let cookie = self.cookie(key, value, COOKIE_MAX_AGE);
        let len = cookie.to_string().len();
        if len > COOKIE_SIZE_LIMIT {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                len,
                limit: COOKIE_SIZE_LIMIT,
            });
        }
        self.jar.add(cookie);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.jar.add(self.cookie(key, "", Duration::from_secs(0)));
        Ok(())
    }
}
