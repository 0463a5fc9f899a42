use crate::placemark::Coordinate;
use crate::presenter::SearchResultItem;
use crate::recent::{RecentItem, RecentItemStore};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tracing::{debug, info};

/// Destination handed over to route calculation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coordinate: Coordinate,
    pub name: String,
}

impl Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.coordinate)
    }
}

/// Records a selected row as a recent item. Rows without a placemark or
/// coordinate are ignored.
pub fn select_destination(
    item: &SearchResultItem,
    recents: &mut RecentItemStore,
) -> Option<Waypoint> {
    let Some(placemark) = &item.placemark else {
        debug!("Ignoring selection of {}", item.text);
        return None;
    };
    let Some(coordinate) = placemark.coordinate else {
        debug!("Ignoring selection of {} without a location", item.text);
        return None;
    };

    recents.add(RecentItem::new(placemark.clone()));
    recents.save();

    let waypoint = Waypoint {
        coordinate,
        name: placemark.formatted_name(),
    };
    info!("Selected destination {waypoint}");
    Some(waypoint)
}
