//! Query predicates and search scopes

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::container::ContainerRoot;
use super::errors::DomainError;

// ============================================================================
// QueryPredicate
// ============================================================================

/// Filter applied to every indexed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPredicate {
    /// Path begins with the given text (whole-container listing)
    PathPrefix(String),
    /// Path equals the given path (single-item tracking)
    ExactPath(PathBuf),
}

impl QueryPredicate {
    /// Prefix predicate covering everything under a container root
    #[must_use]
    pub fn under(root: &ContainerRoot) -> Self {
        QueryPredicate::PathPrefix(root.prefix().to_string())
    }

    /// Returns true if the indexed path satisfies this predicate
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            QueryPredicate::PathPrefix(prefix) => path.to_string_lossy().starts_with(prefix.as_str()),
            QueryPredicate::ExactPath(exact) => path == exact,
        }
    }

    /// Exact predicates track a single item
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self, QueryPredicate::ExactPath(_))
    }
}

impl Display for QueryPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QueryPredicate::PathPrefix(prefix) => write!(f, "path beginswith {prefix}"),
            QueryPredicate::ExactPath(path) => write!(f, "path == {}", path.display()),
        }
    }
}

// ============================================================================
// SearchScope
// ============================================================================

/// Region of a container a query searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Everything in the container
    Data,
    /// The user-visible `Documents` folder of the container
    Documents,
}

impl SearchScope {
    /// Both scopes; queries search their union by default
    pub const ALL: [SearchScope; 2] = [SearchScope::Data, SearchScope::Documents];

    /// Directory this scope covers inside a container
    #[must_use]
    pub fn root_in(&self, container: &ContainerRoot) -> PathBuf {
        match self {
            SearchScope::Data => container.as_path().to_path_buf(),
            SearchScope::Documents => container.as_path().join("Documents"),
        }
    }
}

impl Display for SearchScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SearchScope::Data => write!(f, "data"),
            SearchScope::Documents => write!(f, "documents"),
        }
    }
}

impl FromStr for SearchScope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(SearchScope::Data),
            "documents" => Ok(SearchScope::Documents),
            other => Err(DomainError::UnknownScope(other.to_string())),
        }
    }
}
