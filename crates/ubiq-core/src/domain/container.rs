//! Container identifiers and resolved root locations

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// ContainerId
// ============================================================================

/// Stable identifier of a logical cloud storage namespace
///
/// Must be non-empty and must not contain path separators, so it can never
/// be used to address anything outside the store's container area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a new ContainerId with validation
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains('/')
            || id.contains('\\')
            || id.contains('\0')
        {
            return Err(DomainError::InvalidContainerId(id));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

// ============================================================================
// ContainerRoot
// ============================================================================

/// Root storage location a container resolved to
///
/// Resolved per call and never cached. The textual [`prefix`](Self::prefix)
/// always ends with a separator so stripping it from an entry path can never
/// cut a path segment in half.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerRoot {
    path: PathBuf,
    prefix: String,
}

impl ContainerRoot {
    /// Create a root from an absolute path
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "container root must be absolute: {}",
                path.display()
            )));
        }
        let mut prefix = path.to_string_lossy().into_owned();
        if !prefix.ends_with(MAIN_SEPARATOR) {
            prefix.push(MAIN_SEPARATOR);
        }
        Ok(Self { path, prefix })
    }

    /// The root as a filesystem path
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// The root as text, always terminated by a separator
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolves a caller-supplied relative name below this root
    ///
    /// Rejects empty names, absolute names and names containing `..`, any of
    /// which would address something outside the container.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, DomainError> {
        let rel = Path::new(relative);
        if relative.is_empty() || rel.is_absolute() {
            return Err(DomainError::InvalidRelativePath(relative.to_string()));
        }
        let escapes = rel.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(DomainError::InvalidRelativePath(relative.to_string()));
        }
        Ok(self.path.join(rel))
    }

    /// Strips the root prefix from an absolute path, byte for byte
    ///
    /// Returns `None` when the path does not start with the prefix.
    #[must_use]
    pub fn relative_of(&self, absolute: &Path) -> Option<String> {
        let absolute = absolute.to_string_lossy();
        absolute
            .strip_prefix(self.prefix.as_str())
            .map(str::to_string)
    }
}

impl Display for ContainerRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
