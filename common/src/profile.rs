//! Profile header data: name, description, avatar and social links.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum_macros::{AsRefStr, Display, EnumString};

const BUNDLED_PROFILE_JSON: &str = include_str!("../data/profile.json");

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SocialPlatform {
    Youtube,
    Instagram,
    Tiktok,
    Pinterest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLink {
    pub platform: SocialPlatform,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub image: String,
    #[serde(default)]
    pub social_links: Vec<SocialLink>,
}

impl Profile {
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_PROFILE_JSON).context("Bundled profile is invalid")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Profile =
            serde_json::from_str(json).context("Failed to parse profile JSON")?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = fs_err::read_to_string(path)?;
        Self::from_json(&json).with_context(|| format!("Invalid profile in {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Profile name must not be empty");
        }
        for link in &self.social_links {
            if !link.url.starts_with("https://") {
                bail!("Social link for {} must use https: {}", link.platform, link.url);
            }
        }
        Ok(())
    }
}
