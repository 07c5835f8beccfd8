use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::Record;

/// How a record's canonical key is derived from its URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// Full URL string equality.
    #[default]
    FullUrl,
    /// Scheme + host + path; query and fragment dropped.
    StripQuery,
}

impl KeyPolicy {
    pub fn key(&self, url: &str) -> String {
        match self {
            KeyPolicy::FullUrl => url.to_string(),
            KeyPolicy::StripQuery => match Url::parse(url) {
                Ok(mut parsed) => {
                    parsed.set_query(None);
                    parsed.set_fragment(None);
                    parsed.into()
                }
                Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
            },
        }
    }
}

/// Ordered, deduplicated result set.
///
/// The first record seen for a key wins; later duplicates are dropped and
/// emission order is insertion order.
#[derive(Debug, Default)]
pub struct Deduplicator {
    policy: KeyPolicy,
    seen: HashSet<String>,
    records: Vec<Record>,
}

impl Deduplicator {
    pub fn new(policy: KeyPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Returns whether the record was newly added.
    pub fn accept(&mut self, record: Record) -> bool {
        if self.seen.insert(self.policy.key(&record.url)) {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
