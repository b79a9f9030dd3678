use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RepoParseError;

/// A GitHub repository identified as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackedRepo(String);

impl TrackedRepo {
    pub fn new(id: impl Into<String>) -> Result<Self, RepoParseError> {
        let id = id.into();
        match id.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self(id))
            }
            _ => Err(RepoParseError(id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(owner, _)| owner).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or_default()
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}", self.0)
    }
}

impl fmt::Display for TrackedRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TrackedRepo {
    type Err = RepoParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TrackedRepo {
    type Error = RepoParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrackedRepo> for String {
    fn from(repo: TrackedRepo) -> Self {
        repo.0
    }
}

/// The tracked set is fixed once the poller is built.
pub type RepoList = Arc<[TrackedRepo]>;

pub fn repo_list<I, S>(ids: I) -> Result<RepoList, RepoParseError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter()
        .map(TrackedRepo::new)
        .collect::<Result<Vec<_>, _>>()
        .map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_owner_and_name() {
        let repo = TrackedRepo::new("BlackRoad-OS/pi-ai-hub").unwrap();
        assert_eq!(repo.owner(), "BlackRoad-OS");
        assert_eq!(repo.name(), "pi-ai-hub");
        assert_eq!(repo.html_url(), "https://github.com/BlackRoad-OS/pi-ai-hub");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "noslash", "/name", "owner/", "a/b/c"] {
            assert!(TrackedRepo::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn deserializes_from_plain_string() {
        let repo: TrackedRepo = serde_json::from_str("\"org/project\"").unwrap();
        assert_eq!(repo.as_str(), "org/project");
        assert!(serde_json::from_str::<TrackedRepo>("\"org\"").is_err());
    }
}
