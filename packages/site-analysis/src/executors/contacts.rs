//! Contact harvesting from page HTML.
//!
//! Collects social profile links, e-mail addresses, phone numbers, street
//! addresses and feed links. Every list comes back sorted and de-duplicated.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use url::Url;

use super::page_text;
use crate::error::{ExecutorError, ExecutorResult};
use crate::traits::executor::Executor;
use crate::types::WorkInput;

// =============================================================================
// Patterns
// =============================================================================

struct SocialPattern {
    platform: &'static str,
    regex: Regex,
    /// Rejected when the first path segment starts with one of these
    skip_prefixes: &'static [&'static str],
}

fn social(platform: &'static str, pattern: &str, skip_prefixes: &'static [&'static str]) -> SocialPattern {
    SocialPattern {
        platform,
        regex: Regex::new(pattern).unwrap(),
        skip_prefixes,
    }
}

static SOCIAL_PATTERNS: LazyLock<Vec<SocialPattern>> = LazyLock::new(|| {
    vec![
        social("facebook", r"facebook\.com/([\w.-]+)/?$", &["share", "sharer", "login", "signup", "groups"]),
        social("twitter", r"twitter\.com/([\w.-]+)/?$", &["share", "intent", "home", "search"]),
        social("linkedin", r"linkedin\.com/(?:company/|in/|profile/view\?id=)[\w.-]+/?$", &[]),
        social("instagram", r"instagram\.com/[\w.-]+/?$", &[]),
        social("youtube", r"youtube\.com/(?:channel/|user/|c/)[\w.-]+/?$", &[]),
        social("tiktok", r"tiktok\.com/@[\w.-]+/?$", &[]),
        social("pinterest", r"pinterest\.com/[\w.-]+/?$", &[]),
        social("github", r"github\.com/[\w.-]+/?$", &[]),
        social("medium", r"medium\.com/@[\w.-]+/?$", &[]),
        social("reddit", r"reddit\.com/user/[\w.-]+/?$", &[]),
        social("tumblr", r"[\w.-]+\.tumblr\.com/?$", &[]),
        social("snapchat", r"snapchat\.com/add/[\w.-]+/?$", &[]),
        social("vimeo", r"vimeo\.com/(?:channels/|groups/|albums/)?[\w.-]+/?$", &[]),
        social("soundcloud", r"soundcloud\.com/[\w.-]+/?$", &[]),
        social("behance", r"behance\.net/[\w.-]+/?$", &[]),
        social("dribbble", r"dribbble\.com/[\w.-]+/?$", &[]),
        social("quora", r"quora\.com/profile/[\w.-]+/?$", &[]),
        social("flickr", r"flickr\.com/people/[\w@.-]+/?$", &[]),
        social("deviantart", r"deviantart\.com/[\w.-]+/?$", &[]),
        social("wordpress", r"[\w.-]+\.wordpress\.com/?$", &[]),
    ]
});

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,7}\b").unwrap()
});

static EMAIL_EXACT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,7}$").unwrap()
});

// International numbers only; a leading + makes the country unambiguous
static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+\d{1,3}[\d\s().-]{4,}\d").unwrap()
});

static ADDRESS_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // US: number, street, type, optional unit, city, state, zip
        r"\d{1,5}\s+(?:[a-z0-9.-]+\s+){1,3}(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|way|place|pl|court|ct)\.?(?:\s+(?:apt|suite|unit)\s+\d+)?,?\s+[a-z\s]+,?\s+[a-z]{2}\s+\d{5}(?:-\d{4})?",
        // UK: number, street, optional town, postcode
        r"\d{1,4}\s+[a-z\s]+(?:,\s*[a-z\s]+)*,\s*[a-z]{1,2}\d{1,2}[a-z]?\s*\d[a-z]{2}",
        // Generic: number, street type, postal code
        r"\d{1,5}[\w\s,-]*?(?:street|avenue|road|boulevard|lane|drive|way|place|court)[\w\s,-]+?\d{4,6}",
    ]
    .iter()
    .map(|pattern| {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .unwrap()
    })
    .collect()
});

static FEED_HREF_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(rss|feed)").unwrap());

static FEED_TYPE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(rss|atom)\+xml").unwrap());

const STREET_KEYWORDS: &[&str] = &[
    "street", "st", "avenue", "ave", "road", "rd", "boulevard", "blvd", "lane", "ln", "drive",
    "dr", "way", "place", "court", "ct",
];

// =============================================================================
// Output
// =============================================================================

/// Everything harvested from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contacts {
    /// Platform name to profile URLs
    pub social_links: BTreeMap<String, Vec<String>>,
    pub emails: Vec<String>,
    /// `+` followed by 7-15 digits
    pub phone_numbers: Vec<String>,
    pub addresses: Vec<String>,
    pub rss_feeds: Vec<String>,
}

/// Flatten contacts into one string per column, multiple values joined by `??`.
///
/// This is the shape used for CSV export: one column per social platform
/// plus `emails`, `phone_numbers`, `addresses` and `rss_feeds`.
pub fn flatten_contacts(contacts: &Contacts) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = contacts
        .social_links
        .iter()
        .map(|(platform, links)| (platform.clone(), links.join("??")))
        .collect();

    flat.insert("emails".into(), contacts.emails.join("??"));
    flat.insert("phone_numbers".into(), contacts.phone_numbers.join("??"));
    flat.insert("addresses".into(), contacts.addresses.join("??"));
    flat.insert("rss_feeds".into(), contacts.rss_feeds.join("??"));
    flat
}

// =============================================================================
// Blacklist
// =============================================================================

/// Host patterns whose links are ignored.
///
/// Each entry is a regex searched against the host; an entry that is not a
/// valid regex is matched literally.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    patterns: Vec<Regex>,
}

impl Blacklist {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .filter_map(|p| Regex::new(&p).or_else(|_| Regex::new(&regex::escape(&p))).ok())
            .collect();
        Self { patterns }
    }

    /// Whether `host` matches any pattern.
    pub fn blocks_host(&self, host: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(host))
    }

    fn blocks_url(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| self.blocks_host(host))
    }

    fn blocks_email(&self, email: &str) -> bool {
        email
            .rsplit_once('@')
            .is_some_and(|(_, domain)| self.blocks_host(domain))
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Social/contact executor.
#[derive(Debug, Clone, Default)]
pub struct ContactExtractor {
    blacklist: Blacklist,
}

impl ContactExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blacklist(mut self, blacklist: Blacklist) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// Harvest contacts from `html`, resolving relative links against `base`.
    pub fn extract(&self, html: &str, base: Option<&Url>) -> Contacts {
        let document = Html::parse_document(html);
        let text = page_text(&document);

        Contacts {
            social_links: self.social_links(&document, base),
            emails: self.emails(&document, &text),
            phone_numbers: phone_numbers(&text),
            addresses: addresses(&text),
            rss_feeds: self.rss_feeds(&document, base),
        }
    }

    fn resolve(&self, href: &str, base: Option<&Url>) -> Option<Url> {
        let url = match base {
            Some(base) => base.join(href).ok()?,
            None => Url::parse(href).ok()?,
        };
        (!self.blacklist.blocks_url(&url)).then_some(url)
    }

    fn social_links(&self, document: &Html, base: Option<&Url>) -> BTreeMap<String, Vec<String>> {
        let mut found: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for href in attr_values(document, "a[href]", "href") {
            let Some(url) = self.resolve(&href.to_lowercase(), base) else {
                continue;
            };
            let link = url.as_str();

            for pattern in SOCIAL_PATTERNS.iter() {
                let Some(captures) = pattern.regex.captures(link) else {
                    continue;
                };
                let skipped = captures.get(1).is_some_and(|segment| {
                    pattern
                        .skip_prefixes
                        .iter()
                        .any(|prefix| segment.as_str().starts_with(prefix))
                });
                if !skipped {
                    found
                        .entry(pattern.platform.to_string())
                        .or_default()
                        .insert(link.to_string());
                }
            }
        }

        found
            .into_iter()
            .map(|(platform, links)| (platform, links.into_iter().collect()))
            .collect()
    }

    fn emails(&self, document: &Html, text: &str) -> Vec<String> {
        let in_text = EMAIL_REGEX.find_iter(text).map(|m| m.as_str().to_string());

        let in_mailto = attr_values(document, "a[href^='mailto:']", "href")
            .into_iter()
            .filter_map(|href| {
                let address = href.strip_prefix("mailto:")?.split('?').next()?.trim();
                EMAIL_EXACT_REGEX.is_match(address).then(|| address.to_string())
            });

        in_text
            .chain(in_mailto)
            .filter(|email| !self.blacklist.blocks_email(email))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn rss_feeds(&self, document: &Html, base: Option<&Url>) -> Vec<String> {
        let mut feeds = BTreeSet::new();

        if let Ok(selector) = Selector::parse("link[type][href]") {
            for element in document.select(&selector) {
                let typed_feed = element
                    .value()
                    .attr("type")
                    .is_some_and(|t| FEED_TYPE_REGEX.is_match(t));
                if !typed_feed {
                    continue;
                }
                if let Some(url) = element.value().attr("href").and_then(|h| self.resolve(h, base)) {
                    feeds.insert(url.to_string());
                }
            }
        }

        for href in attr_values(document, "a[href]", "href") {
            if !FEED_HREF_REGEX.is_match(&href) {
                continue;
            }
            if let Some(url) = self.resolve(&href, base) {
                feeds.insert(url.to_string());
            }
        }

        feeds.into_iter().collect()
    }
}

fn attr_values(document: &Html, selector: &str, attr: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(|value| value.trim().to_string())
        .collect()
}

fn phone_numbers(text: &str) -> Vec<String> {
    PHONE_REGEX
        .find_iter(text)
        .filter_map(|m| {
            let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
            (7..=15).contains(&digits.len()).then(|| format!("+{}", digits))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn addresses(text: &str) -> Vec<String> {
    ADDRESS_REGEXES
        .iter()
        .flat_map(|regex| regex.find_iter(text))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|address| is_plausible_address(address))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Needs a street keyword as a whole word and at least one digit.
fn is_plausible_address(address: &str) -> bool {
    let lower = address.to_lowercase();
    let has_keyword = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| STREET_KEYWORDS.contains(&word));
    has_keyword && lower.chars().any(|c| c.is_ascii_digit())
}

#[async_trait]
impl Executor for ContactExtractor {
    async fn execute(&self, input: &WorkInput) -> ExecutorResult<serde_json::Value> {
        let html = input
            .payload
            .as_deref()
            .filter(|html| !html.trim().is_empty())
            .ok_or_else(|| ExecutorError::InvalidInput("html payload is required".into()))?;
        let base = Url::parse(&input.subject_key).ok();

        let contacts = self.extract(html, base.as_ref());
        serde_json::to_value(contacts).map_err(|e| ExecutorError::InvalidInput(e.to_string()))
    }
}
