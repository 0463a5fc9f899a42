use crate::geocoder::{GeocodeQuery, Geocoder};
use crate::placemark::{Coordinate, Placemark};
use crate::presenter::{present, ListSection, SearchResultItem};
use crate::recent::RecentItemStore;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLimits {
    /// Queries this short or shorter only search recent items
    pub min_query_length: usize,
    /// Rows shown while typing
    pub initial: usize,
    /// Rows shown after pressing search, also the geocoder's result count
    pub extended: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            min_query_length: 2,
            initial: 5,
            extended: 10,
        }
    }
}

/// A finished search, tagged with the generation of the call that started it
#[derive(Debug)]
pub struct SearchResults {
    pub generation: u64,
    pub text: String,
    pub items: Vec<SearchResultItem>,
}

/// Turns search text into geocoding requests and merges the replies with
/// matching recent items.
///
/// Geocoding runs on a worker thread. Completions are only applied when the
/// owner calls [`SearchDispatcher::poll`] or [`SearchDispatcher::wait`], so all
/// state stays on the owner's thread. A completion older than one already
/// applied is dropped.
pub struct SearchDispatcher {
    geocoder: Arc<dyn Geocoder>,
    limits: SearchLimits,
    locale: Option<String>,
    generation: u64,
    applied: u64,
    sender: Sender<SearchResults>,
    receiver: Receiver<SearchResults>,
    recent_search_text: String,
    /// Text and full item list of the last applied completion
    recent_search_items: Option<(String, Vec<SearchResultItem>)>,
}

impl SearchDispatcher {
    pub fn new(geocoder: Arc<dyn Geocoder>, limits: SearchLimits, locale: Option<String>) -> Self {
        let (sender, receiver) = channel();
        Self {
            geocoder,
            limits,
            locale,
            generation: 0,
            applied: 0,
            sender,
            receiver,
            recent_search_text: String::new(),
            recent_search_items: None,
        }
    }

    pub fn recent_search_text(&self) -> &str {
        &self.recent_search_text
    }

    pub fn is_pending(&self) -> bool {
        self.applied < self.generation
    }

    pub fn query(&self, text: &str, focal_location: Option<Coordinate>) -> GeocodeQuery {
        let mut query = GeocodeQuery::new(text);
        query.focal_location = focal_location.map(|c| c.coarse());
        query.locale = self.locale.clone();
        query.max_results = self.limits.extended;
        query
    }

    /// Starts a search and returns its generation. Every call produces
    /// exactly one completion.
    pub fn search(
        &mut self,
        text: &str,
        focal_location: Option<Coordinate>,
        recents: &RecentItemStore,
    ) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        self.recent_search_text = text.to_string();

        let recent_matches: Vec<Placemark> = recents
            .filter(text)
            .into_iter()
            .map(|item| item.placemark.clone())
            .collect();

        if text.chars().count() <= self.limits.min_query_length {
            debug!("Searching recent items only for {:?}", text);
            self.complete(generation, text, recent_matches, Vec::new());
            return generation;
        }

        let query = self.query(text, focal_location);
        let geocoder = Arc::clone(&self.geocoder);
        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("geocode-{generation}"))
            .spawn(move || {
                let placemarks = match geocoder.geocode(&query) {
                    Ok(placemarks) => placemarks,
                    Err(err) => {
                        warn!("Geocoding {:?} failed: {err}", &query.text);
                        Vec::new()
                    }
                };
                let results = SearchResults {
                    generation,
                    items: merge(recent_matches, placemarks),
                    text: query.text,
                };
                // Only fails once the dispatcher is gone
                let _ = sender.send(results);
            });

        if let Err(err) = spawned {
            warn!("Could not start geocoding for {:?}: {err}", text);
            let recent_matches = recents
                .filter(text)
                .into_iter()
                .map(|item| item.placemark.clone())
                .collect();
            self.complete(generation, text, recent_matches, Vec::new());
        }
        generation
    }

    fn complete(
        &self,
        generation: u64,
        text: &str,
        recent_matches: Vec<Placemark>,
        placemarks: Vec<Placemark>,
    ) {
        let results = SearchResults {
            generation,
            text: text.to_string(),
            items: merge(recent_matches, placemarks),
        };
        // The receiver lives in self
        let _ = self.sender.send(results);
    }

    fn apply(&mut self, results: SearchResults) -> Option<ListSection> {
        if results.generation <= self.applied {
            debug!(
                "Dropping stale results for {:?} (generation {}, have {})",
                results.text, results.generation, self.applied
            );
            return None;
        }
        self.applied = results.generation;
        let section = present(
            Some(results.text.as_str()),
            &results.items,
            Some(self.limits.initial),
        );
        self.recent_search_items = Some((results.text, results.items));
        Some(section)
    }

    /// Applies every completion that has arrived and returns the newest rows.
    pub fn poll(&mut self) -> Option<ListSection> {
        let mut latest = None;
        while let Ok(results) = self.receiver.try_recv() {
            if let Some(section) = self.apply(results) {
                latest = Some(section);
            }
        }
        latest
    }

    /// Blocks until the completion of the latest search arrives. Older
    /// completions that turn up meanwhile are applied but not returned.
    pub fn wait(&mut self, timeout: Duration) -> Option<ListSection> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let results = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    self.receiver.recv_timeout(remaining).ok()?
                }
                None => self.receiver.recv().ok()?,
            };
            if let Some(section) = self.apply(results) {
                if self.applied == self.generation {
                    return Some(section);
                }
            }
        }
    }

    /// The last full result list, cut to the extended limit. None until a
    /// search has completed.
    pub fn submit(&self) -> Option<ListSection> {
        let (text, items) = self.recent_search_items.as_ref()?;
        Some(present(
            Some(text.as_str()),
            items,
            Some(self.limits.extended),
        ))
    }
}

/// Recent matches first, then geocoding results that aren't already listed.
fn merge(recent_matches: Vec<Placemark>, placemarks: Vec<Placemark>) -> Vec<SearchResultItem> {
    let live: Vec<Placemark> = placemarks
        .into_iter()
        .filter(|p| !recent_matches.iter().any(|r| r.same_place(p)))
        .collect();
    recent_matches
        .into_iter()
        .chain(live)
        .map(SearchResultItem::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::placemark::tests::placemark;
    use crate::placemark::Scope;
    use crate::presenter::NO_RESULTS_TITLE;
    use crate::recent::RecentItem;
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct FakeGeocoder {
        calls: AtomicUsize,
        queries: Mutex<Vec<GeocodeQuery>>,
        results: Vec<Placemark>,
        fail: bool,
    }

    impl FakeGeocoder {
        fn returning(names: &[&str]) -> Self {
            Self {
                results: names
                    .iter()
                    .map(|n| placemark(&format!("place.{n}"), n))
                    .collect(),
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    impl Geocoder for FakeGeocoder {
        fn geocode(&self, query: &GeocodeQuery) -> Result<Vec<Placemark>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            if self.fail {
                return Err(anyhow!("service unavailable"));
            }
            Ok(self.results.clone())
        }
    }

    fn recents(names: &[&str]) -> RecentItemStore {
        let mut store = RecentItemStore::load(Box::<MemoryStore>::default(), 20);
        for name in names.iter().rev() {
            store.add(RecentItem::new(placemark(&format!("place.{name}"), name)));
        }
        store
    }

    fn texts(section: &ListSection) -> Vec<&str> {
        section.items.iter().map(|i| i.text.as_str()).collect()
    }

    fn dispatcher(geocoder: &Arc<FakeGeocoder>) -> SearchDispatcher {
        let geocoder: Arc<dyn Geocoder> = geocoder.clone();
        SearchDispatcher::new(geocoder, SearchLimits::default(), Some("nl".to_string()))
    }

    #[test]
    fn short_queries_skip_geocoding() {
        let geocoder = Arc::new(FakeGeocoder::returning(&["Amsterdam"]));
        let mut dispatcher = dispatcher(&geocoder);
        let recents = recents(&["Amstelveen", "Zaandam"]);

        for text in ["", "a", "Am"] {
            dispatcher.search(text, None, &recents);
        }
        let section = dispatcher.poll().unwrap();
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(texts(&section), ["Amstelveen", "Zaandam"]);
        assert_eq!(section.header.as_deref(), Some("Am"));
        assert!(!dispatcher.is_pending());
    }

    #[test]
    fn short_query_without_matches() {
        let geocoder = Arc::new(FakeGeocoder::default());
        let mut dispatcher = dispatcher(&geocoder);
        dispatcher.search("xy", None, &recents(&["Utrecht"]));
        let section = dispatcher.poll().unwrap();
        assert_eq!(texts(&section), [NO_RESULTS_TITLE]);
    }

    #[test]
    fn one_request_per_long_query() {
        let geocoder = Arc::new(FakeGeocoder::returning(&["Amsterdam"]));
        let mut dispatcher = dispatcher(&geocoder);
        let focal = Coordinate::new(52.3731, 4.8922);

        dispatcher.search("Amsterdam", Some(focal), &recents(&[]));
        let section = dispatcher.wait(TIMEOUT).unwrap();
        assert_eq!(texts(&section), ["Amsterdam"]);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);

        let queries = geocoder.queries.lock().unwrap();
        let query = &queries[0];
        assert_eq!(query.text, "Amsterdam");
        assert_eq!(query.max_results, 10);
        assert!(!query.allowed_scopes.contains(&Scope::Postcode));
        assert!(query.allowed_scopes.contains(&Scope::Address));
        assert!(query.includes_routable_locations);
        assert_eq!(query.focal_location, Some(Coordinate::new(52.37, 4.89)));
        assert_eq!(query.locale.as_deref(), Some("nl"));
    }

    #[test]
    fn recents_first_then_truncated() {
        let names: Vec<String> = (0..10).map(|i| format!("Amsterdam {i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let geocoder = Arc::new(FakeGeocoder::returning(&names));
        let mut dispatcher = dispatcher(&geocoder);
        let recents = recents(&["Amsterdam Zuid", "Amsterdam 3"]);

        dispatcher.search("amsterdam", None, &recents);
        let section = dispatcher.wait(TIMEOUT).unwrap();
        assert_eq!(
            texts(&section),
            ["Amsterdam Zuid", "Amsterdam 3", "Amsterdam 0", "Amsterdam 1", "Amsterdam 2"]
        );

        let extended = dispatcher.submit().unwrap();
        assert_eq!(extended.items.len(), 10);
        assert_eq!(extended.items[0].text, "Amsterdam Zuid");
        // The recent match isn't repeated among the live results
        assert_eq!(
            extended.items.iter().filter(|i| i.text == "Amsterdam 3").count(),
            1
        );
    }

    #[test]
    fn submit_before_any_search() {
        let geocoder = Arc::new(FakeGeocoder::default());
        let dispatcher = dispatcher(&geocoder);
        assert!(dispatcher.submit().is_none());
    }

    #[test]
    fn failure_falls_back_to_recents() {
        let geocoder = Arc::new(FakeGeocoder::failing());
        let mut dispatcher = dispatcher(&geocoder);

        dispatcher.search("Haarlem", None, &recents(&["Haarlem Centrum", "Leiden"]));
        let section = dispatcher.wait(TIMEOUT).unwrap();
        assert_eq!(texts(&section), ["Haarlem Centrum"]);

        dispatcher.search("Groningen", None, &recents(&["Leiden"]));
        let section = dispatcher.wait(TIMEOUT).unwrap();
        assert_eq!(section.items.len(), 1);
        assert_eq!(section.items[0].text, NO_RESULTS_TITLE);
        assert!(!section.items[0].is_selectable());
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    /// Holds back replies for queries starting with "slow" until released
    struct GatedGeocoder {
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Geocoder for GatedGeocoder {
        fn geocode(&self, query: &GeocodeQuery) -> Result<Vec<Placemark>> {
            if query.text.starts_with("slow") {
                self.gate.lock().unwrap().recv()?;
            }
            Ok(vec![placemark(&format!("place.{}", query.text), &query.text)])
        }
    }

    #[test]
    fn stale_results_are_dropped() {
        let (release, gate) = channel();
        let geocoder: Arc<dyn Geocoder> = Arc::new(GatedGeocoder {
            gate: Mutex::new(gate),
        });
        let mut dispatcher = SearchDispatcher::new(geocoder, SearchLimits::default(), None);
        let recents = recents(&[]);

        let first = dispatcher.search("slow query", None, &recents);
        let second = dispatcher.search("fast query", None, &recents);
        assert!(second > first);

        let section = dispatcher.wait(TIMEOUT).unwrap();
        assert_eq!(texts(&section), ["fast query"]);

        release.send(()).unwrap();
        assert!(dispatcher.wait(Duration::from_secs(1)).is_none());
        assert!(dispatcher.poll().is_none());
        assert_eq!(texts(&dispatcher.submit().unwrap()), ["fast query"]);
    }

    #[test]
    fn late_reply_after_timeout_is_not_shown_for_next_query() {
        let (release, gate) = channel();
        let geocoder: Arc<dyn Geocoder> = Arc::new(GatedGeocoder {
            gate: Mutex::new(gate),
        });
        let mut dispatcher = SearchDispatcher::new(geocoder, SearchLimits::default(), None);
        let recents = recents(&[]);

        dispatcher.search("slow Amsterdam", None, &recents);
        assert!(dispatcher.wait(Duration::from_millis(50)).is_none());

        dispatcher.search("slow Rotterdam", None, &recents);
        release.send(()).unwrap();
        // Only the Amsterdam reply can arrive, and it isn't what was asked for
        assert!(dispatcher.wait(Duration::from_millis(500)).is_none());
        assert!(dispatcher.is_pending());

        // Rows and header of the longer list always belong together
        let extended = dispatcher.submit().unwrap();
        assert_eq!(extended.header.as_deref(), Some("slow Amsterdam"));
        assert_eq!(texts(&extended), ["slow Amsterdam"]);

        release.send(()).unwrap();
        let section = dispatcher.wait(TIMEOUT).unwrap();
        assert_eq!(section.header.as_deref(), Some("slow Rotterdam"));
        assert_eq!(texts(&section), ["slow Rotterdam"]);
        assert!(!dispatcher.is_pending());
        let extended = dispatcher.submit().unwrap();
        assert_eq!(extended.header.as_deref(), Some("slow Rotterdam"));
    }

    #[test]
    fn empty_geocoding_results() {
        let geocoder = Arc::new(FakeGeocoder::returning(&[]));
        let mut dispatcher = dispatcher(&geocoder);

        dispatcher.search("Zwolle", None, &recents(&["Leiden"]));
        let section = dispatcher.wait(TIMEOUT).unwrap();
        let rows: Vec<(&str, bool)> = section
            .items
            .iter()
            .map(|i| (i.text.as_str(), i.is_selectable()))
            .collect();
        assert_eq!(rows, [(NO_RESULTS_TITLE, false)]);

        dispatcher.search("Utrecht", None, &recents(&["Utrecht Centraal", "Leiden"]));
        let section = dispatcher.wait(TIMEOUT).unwrap();
        assert_eq!(texts(&section), ["Utrecht Centraal"]);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unbounded_wait() {
        let geocoder = Arc::new(FakeGeocoder::default());
        let mut dispatcher = dispatcher(&geocoder);
        dispatcher.search("Ut", None, &recents(&["Utrecht"]));
        let section = dispatcher.wait(Duration::MAX).unwrap();
        assert_eq!(texts(&section), ["Utrecht"]);
    }

    #[test]
    fn in_order_results_are_all_applied() {
        let geocoder = Arc::new(FakeGeocoder::returning(&["Delft"]));
        let mut dispatcher = dispatcher(&geocoder);
        let recents = recents(&["Den Haag"]);

        dispatcher.search("De", None, &recents);
        assert_eq!(texts(&dispatcher.poll().unwrap()), ["Den Haag"]);
        dispatcher.search("Delft", None, &recents);
        assert!(dispatcher.is_pending());
        assert_eq!(texts(&dispatcher.wait(TIMEOUT).unwrap()), ["Delft"]);
        assert_eq!(dispatcher.recent_search_text(), "Delft");
    }
}
