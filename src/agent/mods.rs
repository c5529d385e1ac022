use super::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Mod package found by the host, as described by its `mod.properties`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub creator: String,

    /// Comma-separated handler class names
    pub injections: String,

    /// Archive the mod was loaded from
    pub archive: PathBuf,
}

impl ModManifest {
    /// Parse the `key=value` (or `key: value`) lines of a properties file
    ///
    /// Only `modid` is required. Line continuations and escapes are not supported.
    pub fn from_properties(text: &str, archive: &Path) -> Result<ModManifest, Error> {
        let mut manifest = ModManifest {
            id: String::new(),
            name: String::new(),
            version: String::new(),
            creator: String::new(),
            injections: String::new(),
            archive: archive.to_owned(),
        };

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match line.find(|c| c == '=' || c == ':') {
                Some(split) => (line[..split].trim(), line[split + 1..].trim()),
                None => (line, ""),
            };
            let field = match key {
                "modid" => &mut manifest.id,
                "name" => &mut manifest.name,
                "version" => &mut manifest.version,
                "creator" => &mut manifest.creator,
                "injections" => &mut manifest.injections,
                _ => continue,
            };
            *field = value.to_owned();
        }

        if manifest.id.is_empty() {
            return Err(Error::Manifest {
                archive: archive.to_owned(),
                reason: String::from("missing modid"),
            });
        }
        Ok(manifest)
    }

    /// Handler classes the mod asks to have scanned, in order
    pub fn handler_class_names(&self) -> Vec<String> {
        self.injections
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl fmt::Display for ModManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.id, self.name, self.version)?;
        if !self.creator.is_empty() {
            write!(f, " by {}", self.creator)?;
        }
        Ok(())
    }
}

/// Finds the mods to load (eg. by listing a `mods` directory)
pub trait ModDiscovery {
    fn discover(&self) -> io::Result<Vec<ModManifest>>;
}

/// Makes an archive's classes visible to the program being edited
pub trait ClassPathAugmenter {
    fn append(&mut self, archive: &Path) -> io::Result<()>;
}
