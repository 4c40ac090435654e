// * Page Classification
// * Maps a visited URL onto the page-type taxonomy with first-match-wins rules

use std::fmt;

use crate::config::constants::{DETAIL_MARKER, HOME_RESOURCE_ID, HTML_SUFFIX, LIST_MARKER};

/// Resource type taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageType {
    /// `/movie/<id>.html`
    Detail,
    /// `/list/<id>.html`
    List,
    /// Any other URL
    Home,
    /// No target URL at all (degenerate beacon)
    #[default]
    Unclassified,
}

impl PageType {
    /// Tag used in counter keys
    ///
    /// Unclassified events are counted as home pages; `label()` keeps them apart.
    pub fn tag(&self) -> &'static str {
        match self {
            PageType::Detail => "detail",
            PageType::List => "list",
            PageType::Home | PageType::Unclassified => "home",
        }
    }

    /// Label for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            PageType::Unclassified => "unclassified",
            other => other.tag(),
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classified page for one visit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageClassification {
    pub page_type: PageType,
    pub resource_id: u64,
    pub url: String,
    pub time: String,
}

/// A path marker and the page type it implies
#[derive(Debug, Clone)]
pub struct PageRule {
    pub marker: String,
    pub page_type: PageType,
}

impl PageRule {
    pub fn new(marker: &str, page_type: PageType) -> Self {
        Self {
            marker: marker.to_string(),
            page_type,
        }
    }

    // * Id is whatever sits between the marker and the next ".html"
    fn match_url(&self, url: &str) -> Option<u64> {
        let start = url.find(&self.marker)? + self.marker.len();
        let rest = &url[start..];
        let id = match rest.find(HTML_SUFFIX) {
            Some(end) => &rest[..end],
            None => "",
        };
        Some(id.parse::<u64>().unwrap_or(0))
    }
}

/// Ordered rule set; earlier rules win
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<PageRule>,
}

impl Classifier {
    pub fn new(rules: Vec<PageRule>) -> Self {
        Self { rules }
    }

    /// Adds a rule with the lowest priority
    pub fn push_rule(&mut self, rule: PageRule) {
        self.rules.push(rule);
    }

    /// Classifies `url`; total over all inputs
    pub fn classify(&self, url: &str, time: &str) -> PageClassification {
        let (page_type, resource_id) = if url.is_empty() {
            (PageType::Unclassified, HOME_RESOURCE_ID)
        } else {
            self.rules
                .iter()
                .find_map(|rule| rule.match_url(url).map(|id| (rule.page_type, id)))
                .unwrap_or((PageType::Home, HOME_RESOURCE_ID))
        };

        PageClassification {
            page_type,
            resource_id,
            url: url.to_string(),
            time: time.to_string(),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(vec![
            PageRule::new(DETAIL_MARKER, PageType::Detail),
            PageRule::new(LIST_MARKER, PageType::List),
        ])
    }
}
