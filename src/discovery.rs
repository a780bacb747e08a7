//! Finding resources on disk and turning identities back into paths.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ResourceError;
use crate::instance::WorldTransform;

/// World chunk images carry their world position in the file name.
pub const DEFAULT_PATTERN: &str = r"^world_(-?\d+)_(-?\d+)\.";

/// Something to load, and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub identity: String,
    pub world: WorldTransform,
}

impl ResourceRequest {
    pub fn new(identity: impl Into<String>, world: WorldTransform) -> Self {
        Self {
            identity: identity.into(),
            world,
        }
    }
}

/// Files directly inside `dir` whose names match `pattern`, sorted by path.
pub fn discover(dir: &Path, pattern: &Regex) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().is_some_and(|name| pattern.is_match(name)) {
            found.push(entry.path());
        }
    }
    found.sort();
    log::debug!("Discovered {} resources in {}", found.len(), dir.display());
    Ok(found)
}

/// Build a request for `path`, taking the world position from the first two
/// capture groups of `pattern` when they parse as integers.
pub fn request_from_path(path: &Path, pattern: &Regex) -> ResourceRequest {
    let world = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| pattern.captures(name))
        .and_then(|captures| {
            let x = captures.get(1)?.as_str().parse::<i64>().ok()?;
            let y = captures.get(2)?.as_str().parse::<i64>().ok()?;
            Some(WorldTransform::at(x as f32, y as f32))
        })
        .unwrap_or_default();
    ResourceRequest::new(path.to_string_lossy(), world)
}

/// Maps identities to files.
///
/// `data/...` identities live under the configured data root; anything else
/// is taken as a filesystem path.
#[derive(Debug, Clone, Default)]
pub struct ResourceResolver {
    data_root: Option<PathBuf>,
}

impl ResourceResolver {
    const DATA_PREFIX: &'static str = "data/";

    pub fn new(data_root: Option<PathBuf>) -> Self {
        Self { data_root }
    }

    pub fn resolve(&self, identity: &str) -> Result<PathBuf, ResourceError> {
        let path = match identity.strip_prefix(Self::DATA_PREFIX) {
            Some(relative) => match &self.data_root {
                Some(root) => root.join(relative),
                None => return Err(ResourceError::Missing(identity.to_string())),
            },
            None => PathBuf::from(identity),
        };

        if path.is_file() {
            Ok(path)
        } else {
            Err(ResourceError::Missing(identity.to_string()))
        }
    }
}
