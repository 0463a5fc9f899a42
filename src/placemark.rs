use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::Display;
use strum_macros::{EnumIter, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Rounded to roughly a kilometre. Only used to bias results, so
    /// there is no reason to send a precise position.
    pub fn coarse(&self) -> Self {
        let round = |x: f64| (x * 100.0).round() / 100.0;
        Self::new(round(self.latitude), round(self.longitude))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((lat, lon)) = s.split_once(',') else {
            return Err(anyhow::anyhow!("expected LAT,LON but got {s}"));
        };
        let latitude: f64 = lat.trim().parse()?;
        let longitude: f64 = lon.trim().parse()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(anyhow::anyhow!("{s} is not a valid coordinate"));
        }
        Ok(Self::new(latitude, longitude))
    }
}

/// Granularity of a geocoding result. Names match the geocoding API's place types.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    EnumIter,
    EnumString,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Country,
    Region,
    Postcode,
    District,
    Place,
    Locality,
    Neighborhood,
    Address,
    #[strum(serialize = "poi")]
    #[serde(rename = "poi")]
    PointOfInterest,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    pub id: Option<String>,
    pub name: String,
    pub qualified_name: Option<String>,
    pub scope: Scope,
    pub coordinate: Option<Coordinate>,
    /// House number, only present for addresses
    pub house_number: Option<String>,
    pub address_lines: Option<Vec<String>>,
    /// ISO 3166-2 code of the containing region e.g. US-CA
    pub region_code: Option<String>,
}

impl Placemark {
    pub fn formatted_name(&self) -> String {
        match (&self.scope, &self.house_number) {
            (Scope::Address, Some(number)) => format!("{} {}", number, self.name),
            _ => self.name.clone(),
        }
    }

    pub fn same_place(&self, other: &Placemark) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name && self.coordinate == other.coordinate,
        }
    }
}

impl fmt::Display for Placemark {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.qualified_name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.formatted_name()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Feature {
    pub id: Option<String>,
    #[serde(default)]
    pub place_type: Vec<String>,
    pub text: String,
    pub place_name: Option<String>,
    pub address: Option<String>,
    pub center: Option<[f64; 2]>,
    #[serde(default)]
    pub properties: FeatureProperties,
    #[serde(default)]
    pub context: Vec<FeatureContext>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FeatureProperties {
    pub short_code: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FeatureContext {
    pub id: String,
    pub text: String,
    pub short_code: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
    pub attribution: Option<String>,
}

impl From<Feature> for Placemark {
    fn from(feature: Feature) -> Self {
        // Unrecognised place types are treated like points of interest
        let scope = feature
            .place_type
            .first()
            .and_then(|t| Scope::from_str(t).ok())
            .unwrap_or(Scope::PointOfInterest);

        let region_code = if scope == Scope::Region {
            feature.properties.short_code
        } else {
            feature
                .context
                .into_iter()
                .find(|c| c.id.starts_with("region."))
                .and_then(|c| c.short_code)
        };

        let address_lines = feature
            .place_name
            .as_ref()
            .map(|name| name.split(", ").map(str::to_string).collect());

        Self {
            id: feature.id,
            name: feature.text,
            qualified_name: feature.place_name,
            scope,
            coordinate: feature.center.map(|[lon, lat]| Coordinate::new(lat, lon)),
            house_number: feature.address,
            address_lines,
            region_code,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn placemark(id: &str, name: &str) -> Placemark {
        Placemark {
            id: Some(id.to_string()),
            name: name.to_string(),
            qualified_name: Some(format!("{name}, Noord-Holland, Netherlands")),
            scope: Scope::Place,
            coordinate: Some(Coordinate::new(52.37, 4.89)),
            house_number: None,
            address_lines: Some(vec![
                name.to_string(),
                "Noord-Holland".to_string(),
                "Netherlands".to_string(),
            ]),
            region_code: Some("NL-NH".to_string()),
        }
    }

    const ADDRESS_FEATURE: &str = r#"{
        "id": "address.7283",
        "type": "Feature",
        "place_type": ["address"],
        "relevance": 1,
        "properties": {"accuracy": "rooftop"},
        "text": "Main Street",
        "place_name": "100 Main Street, Springfield, Illinois 62701, United States",
        "center": [-89.65, 39.78],
        "address": "100",
        "context": [
            {"id": "postcode.1", "text": "62701"},
            {"id": "place.2", "text": "Springfield"},
            {"id": "region.3", "short_code": "US-IL", "text": "Illinois"},
            {"id": "country.4", "short_code": "us", "text": "United States"}
        ]
    }"#;

    #[test]
    fn address_feature_to_placemark() {
        let feature: Feature = serde_json::from_str(ADDRESS_FEATURE).unwrap();
        let placemark = Placemark::from(feature);
        assert_eq!(placemark.scope, Scope::Address);
        assert_eq!(placemark.formatted_name(), "100 Main Street");
        assert_eq!(placemark.region_code.as_deref(), Some("US-IL"));
        assert_eq!(placemark.coordinate, Some(Coordinate::new(39.78, -89.65)));
        assert_eq!(
            placemark.address_lines.unwrap(),
            vec![
                "100 Main Street",
                "Springfield",
                "Illinois 62701",
                "United States"
            ]
        );
    }

    #[test]
    fn region_feature_uses_own_short_code() {
        let json = r#"{
            "id": "region.9",
            "place_type": ["region"],
            "text": "California",
            "place_name": "California, United States",
            "center": [-119.27, 37.27],
            "properties": {"short_code": "US-CA"},
            "context": [{"id": "country.4", "short_code": "us", "text": "United States"}]
        }"#;
        let placemark = Placemark::from(serde_json::from_str::<Feature>(json).unwrap());
        assert_eq!(placemark.scope, Scope::Region);
        assert_eq!(placemark.region_code.as_deref(), Some("US-CA"));
    }

    #[test]
    fn missing_center_and_unknown_type() {
        let json = r#"{"place_type": ["landmark"], "text": "Somewhere"}"#;
        let placemark = Placemark::from(serde_json::from_str::<Feature>(json).unwrap());
        assert_eq!(placemark.scope, Scope::PointOfInterest);
        assert!(placemark.coordinate.is_none());
        assert!(placemark.address_lines.is_none());
    }

    #[test]
    fn same_place_prefers_id() {
        let a = placemark("place.1", "Amsterdam");
        let mut b = placemark("place.1", "Amsterdam");
        b.coordinate = Some(Coordinate::new(0.0, 0.0));
        assert!(a.same_place(&b));

        let mut c = placemark("place.2", "Amsterdam");
        c.id = None;
        assert!(a.same_place(&c));
        c.name = "Rotterdam".to_string();
        assert!(!a.same_place(&c));
    }

    #[test]
    fn parse_coordinate() {
        let coordinate: Coordinate = "52.3731, 4.8922".parse().unwrap();
        assert_eq!(coordinate, Coordinate::new(52.3731, 4.8922));
        assert_eq!(coordinate.coarse(), Coordinate::new(52.37, 4.89));
        assert!("91,0".parse::<Coordinate>().is_err());
        assert!("amsterdam".parse::<Coordinate>().is_err());
    }

    #[test]
    fn scope_names() {
        assert_eq!(Scope::PointOfInterest.to_string(), "poi");
        assert_eq!(Scope::from_str("postcode").unwrap(), Scope::Postcode);
    }
}
