//! Transport seam for hosted repositories.

use std::fmt;
use std::io::Write;

use serde::Deserialize;

use super::RemoteError;

/// A repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    /// Account or organization owning the repository.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoId {
    /// Parses `owner/name`. A `https://github.com/` prefix and a `.git`
    /// suffix are tolerated.
    pub fn parse(input: &str) -> Result<Self, RemoteError> {
        let trimmed = input.trim().trim_end_matches('/');
        let trimmed = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("http://github.com/"))
            .unwrap_or(trimmed);
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

        let parts: Vec<&str> = trimmed.split('/').collect();
        match parts.as_slice() {
            [owner, name] if valid_segment(owner) && valid_segment(name) => Ok(Self {
                owner: (*owner).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(RemoteError::InvalidRepository(input.to_string())),
        }
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.chars().any(char::is_whitespace)
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A tag as returned by the tag listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    /// Tag name, usually a version string.
    pub name: String,
    /// Zip archive of the tagged tree.
    #[serde(rename = "zipball_url")]
    pub zip_url: String,
}

/// Network operations needed to resolve and fetch a repository.
///
/// Every transport failure or non-success response is reported as
/// [`RemoteError::Unreachable`].
pub trait RepositoryHost: Send + Sync {
    /// Lists tags in the order the remote returns them.
    fn list_tags(&self, repo: &RepoId) -> Result<Vec<Tag>, RemoteError>;

    /// Fetches a raw file from `branch`.
    fn fetch_file(&self, repo: &RepoId, branch: &str, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Returns the archive URL of `branch`.
    fn branch_archive_url(&self, repo: &RepoId, branch: &str) -> String;

    /// Streams the body at `url` into `dest`, returning the byte count.
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64, RemoteError>;
}
