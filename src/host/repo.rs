//! Owner and repository names parsed from a repository URL.

use crate::core::{DeskshipError, Result};
use std::fmt;

/// Owner/repository pair derived from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    owner: String,
    repo: String,
}

impl RepoRef {
    /// Build from already-split parts.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse a repository URL into owner and repository.
    ///
    /// Accepts `https://host/owner/repo`, with an optional `.git` suffix or
    /// trailing slash, and the scp-like `git@host:owner/repo.git` form. The
    /// path after the host must be exactly two non-empty segments.
    ///
    /// ```rust
    /// use deskship::host::RepoRef;
    ///
    /// let repo = RepoRef::parse("https://github.com/acme/widget.git").unwrap();
    /// assert_eq!(repo.owner(), "acme");
    /// assert_eq!(repo.repo(), "widget");
    /// assert!(RepoRef::parse("https://github.com/acme").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::InvalidRepository`] when no owner/repository
    /// pair can be derived.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || DeskshipError::InvalidRepository {
            url: url.to_string(),
        };

        let trimmed = url.trim().trim_end_matches('/');
        let (host, path) = match trimmed.split_once("://") {
            Some((_, rest)) => rest.split_once('/').ok_or_else(invalid)?,
            None => trimmed
                .split_once(':')
                .filter(|(user_host, _)| user_host.contains('@'))
                .ok_or_else(invalid)?,
        };

        if host.is_empty() {
            return Err(invalid());
        }

        let path = path.strip_suffix(".git").unwrap_or(path);
        let segments: Vec<&str> = path.split('/').collect();
        let [owner, repo] = segments.as_slice() else {
            return Err(invalid());
        };

        if !is_valid_segment(owner) || !is_valid_segment(repo) {
            return Err(invalid());
        }

        Ok(Self::new(*owner, *repo))
    }

    /// Repository owner (user or organization).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https() {
        let repo = RepoRef::parse("https://github.com/acme/widget").unwrap();
        assert_eq!(repo, RepoRef::new("acme", "widget"));
        assert_eq!(repo.to_string(), "acme/widget");
    }

    #[test]
    fn test_parse_strips_git_suffix_and_slash() {
        assert_eq!(RepoRef::parse("https://github.com/acme/widget.git").unwrap().repo(), "widget");
        assert_eq!(RepoRef::parse("https://github.com/acme/widget/").unwrap().repo(), "widget");
    }

    #[test]
    fn test_parse_scp_form() {
        let repo = RepoRef::parse("git@github.com:acme/widget.git").unwrap();
        assert_eq!(repo.owner(), "acme");
        assert_eq!(repo.repo(), "widget");
    }

    #[test]
    fn test_rejects_urls_without_owner_repo_pair() {
        for url in [
            "",
            "widget",
            "not a url",
            "https://github.com",
            "https://github.com/acme",
            "https://github.com/acme/widget/releases",
            "https://github.com//widget",
            "https://github.com/acme/wid get",
            "acme/widget",
        ] {
            assert!(
                matches!(RepoRef::parse(url), Err(DeskshipError::InvalidRepository { .. })),
                "expected rejection for {url:?}"
            );
        }
    }
}
