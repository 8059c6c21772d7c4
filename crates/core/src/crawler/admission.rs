//! Dedup/ignore decision for discovered torrents.

use regex_lite::Regex;

use crate::repository::{ItemRepository, RepositoryError};

/// Outcome of the admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// An item with the same name is already stored.
    Duplicate(i64),
    /// The name matches the ignore pattern.
    Ignored,
}

/// Decides whether a discovered torrent becomes a new item.
///
/// Dedup is by name. A known name is reported as a duplicate even when it
/// also matches the ignore pattern.
#[derive(Debug, Clone)]
pub struct AdmissionFilter {
    ignore: Option<Regex>,
}

impl AdmissionFilter {
    /// An empty pattern ignores nothing.
    pub fn new(ignore_pattern: &str) -> Result<Self, regex_lite::Error> {
        let ignore = if ignore_pattern.is_empty() {
            None
        } else {
            Some(Regex::new(ignore_pattern)?)
        };
        Ok(Self { ignore })
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.as_ref().is_some_and(|re| re.is_match(name))
    }

    /// Pure decision given the id of an already stored item with this name.
    pub fn decide(&self, known_id: Option<i64>, name: &str) -> Admission {
        if let Some(id) = known_id {
            Admission::Duplicate(id)
        } else if self.is_ignored(name) {
            Admission::Ignored
        } else {
            Admission::Accept
        }
    }

    pub fn should_accept(&self, known_id: Option<i64>, name: &str) -> bool {
        self.decide(known_id, name) == Admission::Accept
    }

    /// Look the name up in the repository and decide.
    pub fn evaluate(
        &self,
        repository: &dyn ItemRepository,
        name: &str,
    ) -> Result<Admission, RepositoryError> {
        let known = repository.find_item_by_name(name)?.map(|item| item.id);
        Ok(self.decide(known, name))
    }
}
