//! Datastore-relative file paths in the `[datastore] dir/file` notation.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static DATASTORE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?P<datastore>[^\]]+)\]\s?(?P<path>.*)$").expect("valid datastore path regex")
});

/// A file location on a datastore, e.g. `[ds1] vm1/a.iso`.
///
/// An empty `path` denotes the datastore root, rendered as `[ds1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatastorePath {
    pub datastore: String,
    pub path: String,
}

impl DatastorePath {
    pub fn new(datastore: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            datastore: datastore.into(),
            path: path.into(),
        }
    }

    /// Datastore root, used as the VM storage path of a config spec.
    pub fn root(datastore: impl Into<String>) -> Self {
        Self::new(datastore, "")
    }

    /// Returns a sibling path in the same directory with a different file name.
    pub fn with_file_name(&self, file_name: &str) -> Self {
        let path = match self.path.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, file_name),
            None => file_name.to_string(),
        };
        Self::new(self.datastore.clone(), path)
    }

    /// Final path segment (the file name).
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for DatastorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}]", self.datastore)
        } else {
            write!(f, "[{}] {}", self.datastore, self.path)
        }
    }
}

impl FromStr for DatastorePath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DATASTORE_PATH_RE
            .captures(s.trim())
            .ok_or_else(|| anyhow::anyhow!("invalid datastore path: {:?}", s))?;
        Ok(Self::new(&caps["datastore"], &caps["path"]))
    }
}
