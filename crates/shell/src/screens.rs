use std::collections::BTreeMap;

use shared::domain::ScreenName;
use thiserror::Error;

pub const INTRO: &str = "intro";

pub fn default_screens() -> BTreeMap<String, String> {
    [
        ("intro", "/static/intro.html"),
        ("guard", "/static/guard.html"),
        ("alfred", "/static/alfred.html"),
        ("tool", "/static/tool.html"),
    ]
    .into_iter()
    .map(|(name, path)| (name.to_string(), path.to_string()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScreenMapError {
    #[error("screen map is empty")]
    Empty,
    #[error("invalid screen name '{0}': names must be non-empty, trimmed and contain no ':'")]
    InvalidName(String),
    #[error("screen '{0}' has no resource path")]
    MissingResource(String),
    #[error("initial screen '{0}' is not configured")]
    UnknownInitial(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenMap {
    resources: BTreeMap<String, String>,
    initial: ScreenName,
}

impl ScreenMap {
    pub fn new(
        resources: BTreeMap<String, String>,
        initial: &str,
    ) -> Result<Self, ScreenMapError> {
        if resources.is_empty() {
            return Err(ScreenMapError::Empty);
        }
        for (name, resource) in &resources {
            // A name with ':' or padding could never come out of a directive.
            if name.is_empty() || name.contains(':') || name.trim() != name {
                return Err(ScreenMapError::InvalidName(name.clone()));
            }
            if resource.trim().is_empty() {
                return Err(ScreenMapError::MissingResource(name.clone()));
            }
        }
        if !resources.contains_key(initial) {
            return Err(ScreenMapError::UnknownInitial(initial.to_string()));
        }
        Ok(Self {
            resources,
            initial: ScreenName::new(initial),
        })
    }

    pub fn initial(&self) -> &ScreenName {
        &self.initial
    }

    pub fn resolve(&self, candidate: &str) -> Option<(ScreenName, &str)> {
        self.resources
            .get_key_value(candidate)
            .map(|(name, resource)| (ScreenName::new(name.as_str()), resource.as_str()))
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.resources.contains_key(candidate)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

impl Default for ScreenMap {
    fn default() -> Self {
        Self {
            resources: default_screens(),
            initial: ScreenName::new(INTRO),
        }
    }
}
