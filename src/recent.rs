use crate::persistence::KeyValueStore;
use crate::placemark::Placemark;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_with::TimestampSeconds;
use tracing::{debug, warn};

pub const RECENT_ITEMS_KEY: &str = "recent_items";
pub const DEFAULT_CAPACITY: usize = 20;

/// A destination the user previously selected
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecentItem {
    pub placemark: Placemark,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub timestamp: DateTime<Utc>,
}

impl RecentItem {
    pub fn new(placemark: Placemark) -> Self {
        Self {
            placemark,
            // Stored as whole seconds
            timestamp: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.placemark.formatted_name().to_lowercase().contains(&text)
            || self
                .placemark
                .qualified_name
                .as_ref()
                .is_some_and(|name| name.to_lowercase().contains(&text))
    }
}

/// Most-recently-used list of selected destinations, bounded by `capacity`.
pub struct RecentItemStore {
    items: Vec<RecentItem>,
    capacity: usize,
    storage: Box<dyn KeyValueStore>,
}

impl RecentItemStore {
    /// Never fails. Missing or unreadable data gives an empty list.
    pub fn load(storage: Box<dyn KeyValueStore>, capacity: usize) -> Self {
        let mut items: Vec<RecentItem> = match storage.get(RECENT_ITEMS_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|err| {
                warn!("Discarding unreadable recent items: {err}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Failed to load recent items: {err}");
                Vec::new()
            }
        };
        items.truncate(capacity);
        debug!("Loaded {} recent items", items.len());
        Self {
            items,
            capacity,
            storage,
        }
    }

    pub fn items(&self) -> &[RecentItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add(&mut self, item: RecentItem) {
        self.items
            .retain(|existing| !existing.placemark.same_place(&item.placemark));
        self.items.insert(0, item);
        self.items.truncate(self.capacity);
    }

    /// Best effort, errors are only logged
    pub fn save(&self) {
        let result = serde_json::to_string(&self.items)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set(RECENT_ITEMS_KEY, &json));
        match result {
            Ok(()) => debug!("Saved {} recent items", self.items.len()),
            Err(err) => warn!("Failed to save recent items: {err}"),
        }
    }

    pub fn filter(&self, text: &str) -> Vec<&RecentItem> {
        if text.is_empty() {
            return self.items.iter().collect();
        }
        self.items.iter().filter(|item| item.matches(text)).collect()
    }
}
