use crate::placemark::{Placemark, Scope};
use std::fmt;

pub const ADDRESS_LINE_SEPARATOR: &str = ", ";
pub const NO_RESULTS_TITLE: &str = "No results";

/// A row in a result list. Rows without a placemark can't be selected.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResultItem {
    pub text: String,
    pub detail_text: Option<String>,
    pub shows_disclosure_indicator: bool,
    pub placemark: Option<Placemark>,
}

impl SearchResultItem {
    pub fn no_results() -> Self {
        Self {
            text: NO_RESULTS_TITLE.to_string(),
            detail_text: None,
            shows_disclosure_indicator: false,
            placemark: None,
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.placemark.is_some()
    }
}

impl From<Placemark> for SearchResultItem {
    fn from(placemark: Placemark) -> Self {
        Self {
            text: placemark.formatted_name(),
            detail_text: Some(placemark_subtitle(&placemark)),
            shows_disclosure_indicator: true,
            placemark: Some(placemark),
        }
    }
}

impl fmt::Display for SearchResultItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.detail_text {
            Some(detail) if !detail.is_empty() => write!(f, "{} ({})", self.text, detail),
            _ => write!(f, "{}", self.text),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListSection {
    pub header: Option<String>,
    pub items: Vec<SearchResultItem>,
}

/// The first `limit` items, or a lone placeholder row when there are none.
pub fn results_or_no_results(
    items: &[SearchResultItem],
    limit: Option<usize>,
) -> Vec<SearchResultItem> {
    if items.is_empty() {
        return vec![SearchResultItem::no_results()];
    }
    let limit = limit.unwrap_or(items.len());
    items.iter().take(limit).cloned().collect()
}

pub fn present(
    header: Option<&str>,
    items: &[SearchResultItem],
    limit: Option<usize>,
) -> ListSection {
    ListSection {
        header: header.map(str::to_string),
        items: results_or_no_results(items, limit),
    }
}

pub fn placemark_subtitle(placemark: &Placemark) -> String {
    match &placemark.address_lines {
        Some(lines) => address_subtitle(
            lines,
            placemark.scope,
            placemark.qualified_name.as_deref(),
            placemark.region_code.as_deref(),
            ADDRESS_LINE_SEPARATOR,
        ),
        None => placemark.to_string(),
    }
}

/// Summarises address lines for display under a result's name.
///
/// For addresses the street line is dropped since it is already the title.
/// When the qualified name has no ", " the lines are assumed to be in
/// reverse order (e.g. Chinese addresses), so the last line is dropped and
/// the rest are joined without a delimiter. With a usable region code the
/// subtitle is cut down to two lines, plus the abbreviated region for
/// scopes finer than a place.
pub fn address_subtitle(
    lines: &[String],
    scope: Scope,
    qualified_name: Option<&str>,
    region_code: Option<&str>,
    delimiter: &str,
) -> String {
    if scope == Scope::Country {
        return String::new();
    }

    let has_commas = qualified_name.is_some_and(|name| name.contains(", "));
    let mut lines = lines.to_vec();
    if scope == Scope::Address && !lines.is_empty() {
        if has_commas {
            lines.remove(0);
        } else {
            lines.pop();
        }
    }

    if let Some(region) = region_code.and_then(abbreviated_region) {
        let subtitle = lines
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(delimiter);
        return match scope {
            Scope::Region | Scope::District | Scope::Place | Scope::Postcode => subtitle,
            _ => format!("{subtitle}{delimiter}{region}"),
        };
    }

    if has_commas {
        lines.join(delimiter)
    } else {
        lines.concat()
    }
}

/// "US-CA" gives "CA". Numeric subdivisions such as "FR-75" give None.
fn abbreviated_region(code: &str) -> Option<&str> {
    let abbreviation = code.rsplit('-').next()?.trim();
    if abbreviation.is_empty() || has_nonzero_leading_number(abbreviation) {
        return None;
    }
    Some(abbreviation)
}

/// Whether `s` starts with a number other than zero, however many digits
fn has_nonzero_leading_number(s: &str) -> bool {
    s.trim_start_matches(['+', '-'])
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .any(|c| c != '0')
}
