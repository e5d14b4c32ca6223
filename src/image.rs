//! Image identifiers and the workspace marker file that names the import target.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::str::FromStr;

use camino::Utf8Path;

use crate::error::SnapshotError;

/// Name of the marker file, relative to the build workspace root.
pub const IMAGE_NAME_FILE: &str = "image.txt";

/// An image identifier of the form `[namespace/]name[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId {
    namespace: Option<String>,
    name: String,
    tag: Option<String>,
}

impl ImageId {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

fn invalid(input: &str, reason: &str) -> SnapshotError {
    SnapshotError::Config(format!("invalid image identifier '{}': {}", input, reason))
}

fn check_part(input: &str, part: &str, what: &str) -> Result<(), SnapshotError> {
    if part.is_empty() {
        return Err(invalid(input, &format!("{} must not be empty", what)));
    }
    if part.chars().any(|c| c.is_whitespace() || c == '/' || c == ':') {
        return Err(invalid(input, &format!("{} contains an invalid character", what)));
    }
    Ok(())
}

impl FromStr for ImageId {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(invalid(s, "identifier is empty"));
        }

        let (repository, tag) = match input.rsplit_once(':') {
            Some((repository, tag)) => (repository, Some(tag)),
            None => (input, None),
        };
        let (namespace, name) = match repository.split_once('/') {
            Some((namespace, name)) => (Some(namespace), name),
            None => (None, repository),
        };

        if let Some(namespace) = namespace {
            check_part(input, namespace, "namespace")?;
        }
        check_part(input, name, "name")?;
        if let Some(tag) = tag {
            check_part(input, tag, "tag")?;
        }

        Ok(Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            tag: tag.map(str::to_string),
        })
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/", namespace)?;
        }
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

/// Loads the import target from the marker file in `workspace`.
///
/// Only the first line is read. A missing file means there is no prior
/// target; an unreadable file or an unparsable first line is a configuration
/// error.
pub fn load_import_target(workspace: &Utf8Path) -> Result<Option<ImageId>, SnapshotError> {
    let path = workspace.join(IMAGE_NAME_FILE);
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("no image marker file at {}", path);
            return Ok(None);
        }
        Err(e) => return Err(SnapshotError::io(format!("failed to open {}", path), e)),
    };

    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .map_err(|e| SnapshotError::io(format!("failed to read {}", path), e))?;

    let image = first_line.parse::<ImageId>()?;
    tracing::info!("import target loaded from {}: {}", path, image);
    Ok(Some(image))
}
