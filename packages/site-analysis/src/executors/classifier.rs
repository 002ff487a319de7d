//! Keyword-based page classifier.

use async_trait::async_trait;
use scraper::Html;
use std::collections::HashMap;

use super::page_text;
use crate::error::{ExecutorError, ExecutorResult};
use crate::traits::executor::Executor;
use crate::types::WorkInput;

/// Category returned when no keyword matches.
pub const FALLBACK_CATEGORY: &str = "Other";

const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("News", &["news", "breaking", "headlines", "politics", "journalism", "editorial", "reporter", "press", "media"]),
    ("E-Commerce", &["shop", "cart", "checkout", "buy", "sale", "price", "shipping", "order", "store", "deals"]),
    ("Government", &["government", "ministry", "department", "council", "parliament", "federal", "municipal", "agency", "citizens", "public"]),
    ("School", &["school", "university", "college", "students", "courses", "campus", "education", "learn", "teachers", "admissions"]),
    ("Sports", &["sports", "football", "soccer", "basketball", "league", "match", "score", "team", "tournament", "athletes"]),
    ("Games", &["games", "gaming", "play", "players", "console", "multiplayer", "esports", "level", "quest"]),
    ("Weather", &["weather", "forecast", "temperature", "rain", "storm", "humidity", "wind", "climate", "radar"]),
    ("Streaming Services", &["stream", "streaming", "watch", "movies", "series", "episodes", "subscribe", "tv", "shows"]),
    ("Computers and Technology", &["software", "technology", "computer", "developer", "cloud", "hardware", "code", "data", "tech", "programming"]),
    ("Food", &["food", "recipe", "recipes", "restaurant", "menu", "cooking", "kitchen", "dinner", "delivery"]),
    ("Health and Fitness", &["health", "fitness", "workout", "medical", "doctor", "wellness", "nutrition", "exercise", "clinic"]),
    ("Social Networking & Messaging", &["friends", "share", "connect", "messages", "chat", "profile", "followers", "social", "community"]),
    ("Forums", &["forum", "thread", "threads", "replies", "posts", "topic", "discussion", "moderator", "members"]),
    ("Photography", &["photo", "photos", "photography", "camera", "gallery", "lens", "portrait", "images"]),
    ("Transport", &["transport", "bus", "train", "transit", "route", "schedule", "rail", "tickets", "station"]),
    ("Travel", &["travel", "hotel", "hotels", "flights", "booking", "vacation", "destination", "tour", "trip"]),
];

/// Scores visible page text against a category → keyword table.
///
/// Each occurrence of a keyword adds one to its category. The highest score
/// wins; ties go to the category listed first.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    categories: Vec<(String, Vec<String>)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|(name, keywords)| {
                    (
                        name.to_string(),
                        keywords.iter().map(|k| k.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A classifier with no categories; add them with `with_category`.
    pub fn empty() -> Self {
        Self {
            categories: Vec::new(),
        }
    }

    /// Append a category. Keywords are matched case-insensitively.
    pub fn with_category<I, S>(mut self, name: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.categories.push((
            name.into(),
            keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        ));
        self
    }

    /// Classify plain text.
    pub fn classify_text(&self, text: &str) -> &str {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *counts.entry(word.to_lowercase()).or_default() += 1;
        }

        let mut best: Option<(&str, usize)> = None;
        for (name, keywords) in &self.categories {
            let score: usize = keywords
                .iter()
                .map(|k| counts.get(k).copied().unwrap_or(0))
                .sum();
            if score > 0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((name.as_str(), score));
            }
        }

        best.map(|(name, _)| name).unwrap_or(FALLBACK_CATEGORY)
    }

    /// Classify the visible text of an HTML page.
    pub fn classify_html(&self, html: &str) -> String {
        let text = page_text(&Html::parse_document(html));
        self.classify_text(&text).to_string()
    }
}

#[async_trait]
impl Executor for KeywordClassifier {
    async fn execute(&self, input: &WorkInput) -> ExecutorResult<serde_json::Value> {
        let html = input
            .payload
            .as_deref()
            .filter(|html| !html.trim().is_empty())
            .ok_or_else(|| ExecutorError::InvalidInput("html payload is required".into()))?;

        let category = self.classify_html(html);
        Ok(serde_json::json!({ "category": category }))
    }
}
