//! Built-in work executors.
//!
//! - `ContactExtractor` - social links, e-mails, phones, addresses, feeds
//! - `KeywordClassifier` - page category from visible text
//! - `DomainLookup` - domain facts and server location

pub mod classifier;
pub mod contacts;
pub mod domain;

pub use classifier::KeywordClassifier;
pub use contacts::{flatten_contacts, Blacklist, ContactExtractor, Contacts};
pub use domain::{DomainInfo, DomainLookup, ServerLocation};

use scraper::Html;

/// Visible text of a document, one space between text nodes.
///
/// Text inside `script`, `style` and `noscript` is skipped.
pub(crate) fn page_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"));
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text
}
