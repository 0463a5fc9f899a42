use crate::placemark::{Coordinate, Placemark, Scope};
use anyhow::Result;
use strum::IntoEnumIterator;

#[derive(Clone, Debug, PartialEq)]
pub struct GeocodeQuery {
    pub text: String,
    /// Coarse position used to rank nearby results higher
    pub focal_location: Option<Coordinate>,
    /// Language code, None lets the service decide
    pub locale: Option<String>,
    pub max_results: usize,
    pub allowed_scopes: Vec<Scope>,
    pub includes_routable_locations: bool,
}

impl GeocodeQuery {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            focal_location: None,
            locale: None,
            max_results: 10,
            allowed_scopes: Self::all_scopes_except(&[Scope::Postcode]),
            includes_routable_locations: true,
        }
    }

    pub fn all_scopes_except(excluded: &[Scope]) -> Vec<Scope> {
        Scope::iter().filter(|s| !excluded.contains(s)).collect()
    }
}

/// Forward geocoding. Implementations block, callers decide which thread.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, query: &GeocodeQuery) -> Result<Vec<Placemark>>;
}

/// The language part of the system locale, unless it is English.
pub fn system_non_english_locale() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| non_english_language(&value))
}

fn non_english_language(locale: &str) -> Option<String> {
    let language = locale
        .split(['_', '-', '.', '@'])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    match language.as_str() {
        "" | "c" | "posix" | "en" => None,
        _ => Some(language),
    }
}
