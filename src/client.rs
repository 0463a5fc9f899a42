use crate::config::MainConfig;
use crate::geocoder::{GeocodeQuery, Geocoder};
use crate::placemark::{FeatureCollection, Placemark};
use anyhow::{anyhow, Result};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, error};
use ureq::{Agent, AgentBuilder, Error};
use url::Url;

pub const URL_BASE: &str = "https://api.mapbox.com";
const USER_AGENT: &str = concat!("destination-search/", env!("CARGO_PKG_VERSION"));

/// Forward geocoding against the Mapbox Geocoding v5 API
#[derive(Debug)]
pub struct Client {
    client: Agent,
    base_url: Url,
    access_token: String,
    retry_limit: u64,
    retry_delay: u64,
}

impl Client {
    pub fn new(access_token: &str) -> Result<Client> {
        Self::with_options(access_token, URL_BASE, 5, 5, 7)
    }

    pub fn from_config(config: &MainConfig) -> Result<Client> {
        let Some(token) = &config.access_token else {
            return Err(anyhow!(
                "No access token configured. Set access_token in the config file \
                or DESTINATION_SEARCH_ACCESS_TOKEN"
            ));
        };
        Self::with_options(
            token,
            &config.base_url,
            config.timeout_secs,
            config.retry_limit,
            config.retry_delay,
        )
    }

    pub fn with_options(
        access_token: &str,
        base_url: &str,
        timeout_secs: u64,
        retry_limit: u64,
        retry_delay: u64,
    ) -> Result<Client> {
        let client = AgentBuilder::new()
            .timeout_read(Duration::from_secs(timeout_secs))
            .timeout_write(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build();
        Ok(Client {
            client,
            base_url: Url::parse(base_url)?,
            access_token: access_token.to_string(),
            retry_limit,
            retry_delay,
        })
    }

    fn get(&self, url: &Url) -> Result<serde_json::Value> {
        // The query string carries the access token
        debug!("Fetching {}{}", url.origin().ascii_serialization(), url.path());
        let mut attempts = 0;
        while attempts < self.retry_limit {
            match self.client.request_url("GET", url).call() {
                Ok(response) => {
                    let json = response.into_json()?;
                    return Ok(json);
                }
                Err(Error::Status(code, response)) => match code {
                    503 | 429 | 408 => {
                        let retry = if let Some(header) = response.header("retry-after") {
                            header.parse()?
                        } else {
                            self.retry_delay
                        };
                        error!("{} for {}, retry in {}", code, url.path(), retry);
                        attempts += 1;
                        sleep(Duration::from_secs(retry));
                    }
                    _ => {
                        let error = response.into_string()?;
                        error!("{code}: {error}");
                        return Err(anyhow!("{error}"));
                    }
                },
                Err(Error::Transport(err)) => {
                    let error = err.to_string();
                    error!("{error}");
                    if let Some(message) = err.message() {
                        error!("{message}");
                    }
                    return Err(anyhow!("{error}"));
                }
            }
        }
        Err(anyhow!("Retry limit exceeded"))
    }

    pub fn forward_url(&self, query: &GeocodeQuery) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("{} is not a valid base URL", self.base_url))?
            .pop_if_empty()
            .extend(["geocoding", "v5", "mapbox.places"])
            .push(&format!("{}.json", query.text));

        let types = query
            .allowed_scopes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("access_token", &self.access_token);
            if let Some(focal) = query.focal_location {
                let proximity = format!("{},{}", focal.longitude, focal.latitude);
                pairs.append_pair("proximity", &proximity);
            }
            if let Some(locale) = &query.locale {
                pairs.append_pair("language", locale);
            }
            pairs.append_pair("types", &types);
            pairs.append_pair("limit", &query.max_results.to_string());
            if query.includes_routable_locations {
                pairs.append_pair("routing", "true");
            }
        }
        Ok(url)
    }
}

impl Geocoder for Client {
    fn geocode(&self, query: &GeocodeQuery) -> Result<Vec<Placemark>> {
        let url = self.forward_url(query)?;
        let response: FeatureCollection = serde_json::from_value(self.get(&url)?)?;
        debug!(
            "{} results for {:?}",
            response.features.len(),
            &query.text
        );
        Ok(response.features.into_iter().map(Placemark::from).collect())
    }
}
