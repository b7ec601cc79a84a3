//! Static per-region promotional cards and the region card selector.

use crate::regions::Region;
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const BUNDLED_CARDS_JSON: &str = include_str!("../data/cards.json");

/// Content a card shows in one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCardContent {
    pub title: String,
    pub image: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    /// Lower value is shown first.
    pub priority: i32,
    /// Regions without an entry do not show the card at all.
    #[serde(default)]
    pub regions: IndexMap<Region, RegionCardContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardsData {
    pub cards: Vec<Card>,
}

/// A card as selected for one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedCard {
    pub id: String,
    pub priority: i32,
    pub content: RegionCardContent,
}

/// Immutable card catalog. Catalog order is the tie-breaker for equal priorities.
#[derive(Debug, Clone)]
pub struct ContentCatalog {
    cards: Vec<Card>,
}

impl ContentCatalog {
    pub fn new(cards: Vec<Card>) -> Result<Self> {
        validate_cards(&cards)?;
        Ok(Self { cards })
    }

    /// Catalog embedded in the binary at build time.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_CARDS_JSON).context("Bundled card catalog is invalid")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let data: CardsData =
            serde_json::from_str(json).context("Failed to parse card catalog JSON")?;
        Self::new(data.cards)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = fs_err::read_to_string(path)?;
        Self::from_json(&json)
            .with_context(|| format!("Invalid card catalog in {}", path.display()))
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Cards that have content for `region`, ascending by priority.
    ///
    /// Equal priorities keep catalog order. The result is freshly allocated on every call,
    /// an empty vector means the region has no content.
    pub fn cards_for_region(&self, region: Region) -> Vec<SelectedCard> {
        let mut selected: Vec<SelectedCard> = self
            .cards
            .iter()
            .filter_map(|card| {
                card.regions.get(&region).map(|content| SelectedCard {
                    id: card.id.clone(),
                    priority: card.priority,
                    content: content.clone(),
                })
            })
            .collect();
        // sort_by_key is stable
        selected.sort_by_key(|card| card.priority);
        selected
    }

    pub fn card_content(&self, card_id: &str, region: Region) -> Option<RegionCardContent> {
        self.cards
            .iter()
            .find(|card| card.id == card_id)
            .and_then(|card| card.regions.get(&region).cloned())
    }
}

fn validate_cards(cards: &[Card]) -> Result<()> {
    let mut seen = HashSet::new();
    for card in cards {
        if card.id.trim().is_empty() {
            bail!("Card id must not be empty");
        }
        if !seen.insert(card.id.as_str()) {
            bail!("Duplicate card id: {}", card.id);
        }
        for (region, content) in &card.regions {
            if content.title.trim().is_empty() {
                bail!("Card {} has an empty title for region {}", card.id, region);
            }
            if !is_allowed_link(&content.link) {
                bail!(
                    "Card {} has an invalid link for region {}: {}",
                    card.id,
                    region,
                    content.link
                );
            }
        }
    }
    Ok(())
}

fn is_allowed_link(link: &str) -> bool {
    link.starts_with("https://")
        || link.starts_with("http://")
        || (link.starts_with('/') && !link.starts_with("//"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn content(title: &str) -> RegionCardContent {
        RegionCardContent {
            title: title.to_string(),
            image: format!("/images/{}.jpg", title.to_lowercase()),
            link: format!("https://example.com/{}", title.to_lowercase()),
        }
    }

    fn card(id: &str, priority: i32, regions: &[Region]) -> Card {
        Card {
            id: id.to_string(),
            priority,
            regions: regions
                .iter()
                .map(|r| (*r, content(&format!("{}-{}", id, r))))
                .collect(),
        }
    }

    fn ids(cards: &[SelectedCard]) -> Vec<&str> {
        cards.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_cards_for_region_filters_and_orders() {
        let catalog = ContentCatalog::new(vec![
            card("A", 2, &[Region::Usa]),
            card("B", 1, &[Region::Usa, Region::Germany]),
        ])
        .unwrap();

        assert_eq!(ids(&catalog.cards_for_region(Region::Usa)), vec!["B", "A"]);
        assert_eq!(ids(&catalog.cards_for_region(Region::Germany)), vec!["B"]);
    }

    #[test]
    fn test_cards_for_region_ties_keep_catalog_order() {
        let catalog = ContentCatalog::new(vec![
            card("first", 5, &[Region::France]),
            card("low", 1, &[Region::France]),
            card("second", 5, &[Region::France]),
            card("third", 5, &[Region::France]),
        ])
        .unwrap();

        assert_eq!(
            ids(&catalog.cards_for_region(Region::France)),
            vec!["low", "first", "second", "third"]
        );
    }

    #[test]
    fn test_cards_for_region_empty() {
        let catalog = ContentCatalog::new(vec![card("A", 1, &[Region::Usa])]).unwrap();
        assert!(catalog.cards_for_region(Region::Canada).is_empty());
    }

    #[test]
    fn test_cards_for_region_never_includes_missing_content() {
        let catalog = ContentCatalog::bundled().unwrap();
        for region in Region::all() {
            let selected = catalog.cards_for_region(region);
            for window in selected.windows(2) {
                assert!(window[0].priority <= window[1].priority);
            }
            for sel in &selected {
                let card = catalog.cards().iter().find(|c| c.id == sel.id).unwrap();
                assert_eq!(card.regions.get(&region), Some(&sel.content));
            }
        }
    }

    #[test]
    fn test_result_is_independent_copy() {
        let catalog = ContentCatalog::new(vec![card("A", 1, &[Region::Uk])]).unwrap();
        let mut first = catalog.cards_for_region(Region::Uk);
        first[0].content.title = "mutated".to_string();
        first.clear();

        let second = catalog.cards_for_region(Region::Uk);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content.title, "A-UK");
    }

    #[test]
    fn test_card_content() {
        let catalog = ContentCatalog::new(vec![card("A", 1, &[Region::Uk])]).unwrap();
        assert_eq!(
            catalog.card_content("A", Region::Uk).map(|c| c.title),
            Some("A-UK".to_string())
        );
        assert_eq!(catalog.card_content("A", Region::Usa), None);
        assert_eq!(catalog.card_content("missing", Region::Uk), None);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "cards": [
                {
                    "id": "gear",
                    "priority": 3,
                    "regions": {
                        "USA": {"title": "Gear", "image": "/g.jpg", "link": "https://example.com/us"},
                        "Germany": {"title": "Ausrüstung", "image": "/g.jpg", "link": "https://example.de"}
                    }
                },
                {"id": "empty", "priority": 1}
            ]
        }"#;
        let catalog = ContentCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(ids(&catalog.cards_for_region(Region::Germany)), vec!["gear"]);
        assert!(catalog.cards_for_region(Region::France).is_empty());
    }

    #[test]
    fn test_from_json_rejects_unknown_region() {
        let json = r#"{"cards": [{"id": "x", "priority": 1, "regions": {
            "Spain": {"title": "T", "image": "/i.jpg", "link": "https://example.es"}
        }}]}"#;
        assert!(ContentCatalog::from_json(json).is_err());
    }

    #[test]
    fn test_validation_rejects_duplicates_and_bad_links() {
        let dup = ContentCatalog::new(vec![card("A", 1, &[]), card("A", 2, &[])]);
        assert!(dup.unwrap_err().to_string().contains("Duplicate card id"));

        let empty_id = ContentCatalog::new(vec![card(" ", 1, &[])]);
        assert!(empty_id.is_err());

        let mut bad = card("B", 1, &[Region::Usa]);
        bad.regions.get_mut(&Region::Usa).unwrap().link = "javascript:alert(1)".to_string();
        assert!(ContentCatalog::new(vec![bad]).is_err());

        let mut protocol_relative = card("C", 1, &[Region::Usa]);
        protocol_relative.regions.get_mut(&Region::Usa).unwrap().link =
            "//evil.example".to_string();
        assert!(ContentCatalog::new(vec![protocol_relative]).is_err());
    }

    #[test]
    fn test_bundled_catalog_loads() {
        let catalog = ContentCatalog::bundled().unwrap();
        assert!(!catalog.is_empty());
        assert!(!catalog.cards_for_region(Region::Usa).is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cards": [{{"id": "f", "priority": 1, "regions": {{"Canada": {{"title": "F", "image": "/f.jpg", "link": "/f"}}}}}}]}}"#
        )
        .unwrap();
        let catalog = ContentCatalog::load_from_file(file.path()).unwrap();
        assert_eq!(ids(&catalog.cards_for_region(Region::Canada)), vec!["f"]);

        assert!(ContentCatalog::load_from_file(Path::new("/nonexistent/cards.json")).is_err());
    }
}
