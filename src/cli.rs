use crate::client::Client;
use crate::config::Config;
use crate::dispatcher::SearchDispatcher;
use crate::geocoder::system_non_english_locale;
use crate::logging::{setup_logging, LogLevel};
use crate::placemark::Coordinate;
use crate::presenter::{ListSection, SearchResultItem};
use crate::recent::RecentItemStore;
use crate::services::select_destination;
use crate::util::format_age;
use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use comfy_table::Table;
use inquire::{Select, Text};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

fn default(path: &Path) -> String {
    format!("[default: {}]", path.as_os_str().to_string_lossy())
}

/// Find navigation destinations
#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, value_name = "DIR", help = default(&Config::default_dirs().state)) ]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[arg(short, long = "config", value_name = "FILE", help = default(&Config::default_path()))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,

    /// [default: warn]
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<LogLevel>,

    /// Prefer results near this position e.g. 52.37,4.89 (overrides config)
    #[arg(short = 'n', long = "near", value_name = "LAT,LON")]
    #[serde(skip_serializing_if = "Option::is_none")]
    focal_location: Option<Coordinate>,

    #[command(subcommand)]
    #[serde(skip)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Save a geocoding access token in the config file. Searching needs
    /// one, even for short queries that only match recent destinations.
    Init,
    /// Search for a destination and print the results (needs an access token)
    Search {
        text: String,
        /// Show the longer list, as if the search button was pressed
        #[arg(short, long)]
        submit: bool,
    },
    /// Search interactively and pick a destination (the default)
    Pick { text: Option<String> },
    /// List recently picked destinations
    Recent {
        /// Only show destinations containing this text
        #[arg(short, long)]
        filter: Option<String>,
    },
}

pub fn cli() -> Result<()> {
    let args = Cli::parse();

    let mut config = Config::from_cli(&args)?;
    if let Some(level) = args.log_level {
        config.main.logging.console_level = level;
        config.main.logging.file_level = level;
    }
    let _guard = setup_logging(&config.main.logging, &config.main.state_dir);
    debug!("Command line arguments: {:#?}", &args);
    debug!("Config file: {}", config.config_path.display());

    match &args.command {
        Some(Commands::Init) => init(&mut config)?,
        Some(Commands::Search { text, submit }) => search(&config, text, *submit)?,
        Some(Commands::Pick { text }) => pick(&config, text)?,
        Some(Commands::Recent { filter }) => recent(&config, filter)?,
        None => pick(&config, &None)?,
    }
    Ok(())
}

fn init(config: &mut Config) -> Result<()> {
    let token = Text::new("Geocoding access token").prompt()?;
    config.main.access_token = Some(token.trim().to_string());
    config.write_config_file()?;
    config.get_database()?;
    Ok(())
}

fn open_recents(config: &Config) -> Result<RecentItemStore> {
    let database = config.get_database()?;
    Ok(RecentItemStore::load(
        Box::new(database),
        config.main.recent_capacity,
    ))
}

fn create_dispatcher(config: &Config) -> Result<SearchDispatcher> {
    let client = Client::from_config(&config.main)?;
    let locale = config
        .main
        .language
        .clone()
        .or_else(system_non_english_locale);
    Ok(SearchDispatcher::new(
        Arc::new(client),
        config.main.limits,
        locale,
    ))
}

/// Long enough for a request that exhausts its retries
fn search_timeout(config: &Config) -> Duration {
    let main = &config.main;
    let retries = main
        .retry_limit
        .saturating_mul(main.retry_delay.saturating_add(1));
    Duration::from_secs(main.timeout_secs.saturating_mul(2).saturating_add(retries))
}

fn search(config: &Config, text: &str, submit: bool) -> Result<()> {
    let recents = open_recents(config)?;
    let mut dispatcher = create_dispatcher(config)?;
    dispatcher.search(text, config.main.focal_location, &recents);

    let Some(section) = dispatcher.wait(search_timeout(config)) else {
        return Err(anyhow!("Timed out searching for {text}"));
    };
    let section = if submit {
        dispatcher.submit().unwrap_or(section)
    } else {
        section
    };
    print_section(&section);
    Ok(())
}

enum Choice {
    Destination(SearchResultItem),
    MoreResults,
    SearchAgain,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Choice::Destination(item) => write!(f, "{item}"),
            Choice::MoreResults => write!(f, "More results…"),
            Choice::SearchAgain => write!(f, "Search again…"),
        }
    }
}

fn pick(config: &Config, text: &Option<String>) -> Result<()> {
    let mut recents = open_recents(config)?;
    let mut dispatcher = create_dispatcher(config)?;
    let mut text = text.clone();

    loop {
        let input = match text.take() {
            Some(text) => text,
            None => Text::new("Where to?").prompt()?,
        };
        dispatcher.search(&input, config.main.focal_location, &recents);
        let Some(mut section) = dispatcher.wait(search_timeout(config)) else {
            error!("Timed out searching for {input}");
            continue;
        };

        let mut extended = false;
        loop {
            let mut choices: Vec<Choice> = section
                .items
                .iter()
                .cloned()
                .map(Choice::Destination)
                .collect();
            let more = dispatcher
                .submit()
                .filter(|s| !extended && s.items.len() > section.items.len());
            if more.is_some() {
                choices.push(Choice::MoreResults);
            }
            choices.push(Choice::SearchAgain);

            match Select::new("Select a destination:", choices).prompt()? {
                Choice::Destination(item) => match select_destination(&item, &mut recents) {
                    Some(waypoint) => {
                        println!("{waypoint}");
                        return Ok(());
                    }
                    None => {
                        info!("{} can't be used as a destination", item.text);
                        break;
                    }
                },
                Choice::MoreResults => {
                    if let Some(more) = more {
                        section = more;
                    }
                    extended = true;
                }
                Choice::SearchAgain => break,
            }
        }
    }
}

fn recent(config: &Config, filter: &Option<String>) -> Result<()> {
    let recents = open_recents(config)?;
    let items = recents.filter(filter.as_deref().unwrap_or_default());
    if items.is_empty() {
        println!("No recent destinations");
        return Ok(());
    }

    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["Name", "Address", "Coordinate", "Picked"]);
    for item in items {
        let row = SearchResultItem::from(item.placemark.clone());
        let coordinate = item
            .placemark
            .coordinate
            .map(|c| c.to_string())
            .unwrap_or_default();
        table.add_row(vec![
            row.text,
            row.detail_text.unwrap_or_default(),
            coordinate,
            format!("{} ago", format_age(now - item.timestamp)),
        ]);
    }
    println!("{table}");
    println!(
        "Keeping up to {} recent destinations, {} stored",
        recents.capacity(),
        recents.len()
    );
    Ok(())
}

fn print_section(section: &ListSection) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Name", "Address"]);
    for (i, item) in section.items.iter().enumerate() {
        let index = if item.is_selectable() {
            (i + 1).to_string()
        } else {
            String::new()
        };
        table.add_row(vec![
            index,
            item.text.clone(),
            item.detail_text.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
}
