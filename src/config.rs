//! The repository `config` file, a git-config style INI document.
//!
//! ```text
//! [core]
//! 	repositoryformatversion = 0
//! 	filemode = false
//! 	bare = false
//! [user]
//! 	name = Ada
//! 	email = ada@example.com
//! ```
//!
//! Section and key names are case-insensitive and stored lowercased.
//! Sections and keys this crate does not know about are kept in order and
//! written back unchanged.

use std::fmt;
use std::path::Path;

use crate::commit::Signature;
use crate::error::{Error, Result};
use crate::paths::atomic_write;

/// The only `core.repositoryformatversion` this crate understands.
pub const FORMAT_VERSION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// Parsed `config` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    sections: Vec<Section>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            sections: Vec::new(),
        };
        config.set("core", "repositoryformatversion", &FORMAT_VERSION.to_string());
        config.set("core", "filemode", "false");
        config.set("core", "bare", "false");
        config
    }
}

impl Config {
    /// An empty document with no sections at all.
    pub fn empty() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// Parse INI text.
    ///
    /// `#` and `;` start comment lines. A key with no `=` is a boolean
    /// `true`. Values may be wrapped in double quotes.
    ///
    /// # Errors
    /// [`Error::Corrupt`] for a key outside any section or an unterminated
    /// section header.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::empty();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| {
                    Error::corrupt(format!("config line {}: unterminated section header", lineno + 1))
                })?;
                config.section_mut(&name.trim().to_ascii_lowercase());
                continue;
            }

            let section = config.sections.last_mut().ok_or_else(|| {
                Error::corrupt(format!("config line {}: key outside of any section", lineno + 1))
            })?;
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), unquote(value.trim())),
                None => (line, "true"),
            };
            section
                .entries
                .push((key.to_ascii_lowercase(), value.to_string()));
        }
        Ok(config)
    }

    /// Read and parse the config file at `path`.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("config file {}", path.display())))
            }
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Write the config file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.to_string().as_bytes())
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let pos = match self.sections.iter().position(|s| s.name == name) {
            Some(pos) => pos,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[pos]
    }

    /// Last value of `section.key`, if set.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let section = section.to_ascii_lowercase();
        let key = key.to_ascii_lowercase();
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .last()
    }

    /// Set `section.key`, replacing an existing value in place or appending.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let key = key.to_ascii_lowercase();
        let section = self.section_mut(&section.to_ascii_lowercase());
        match section.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => section.entries.push((key, value.to_string())),
        }
    }

    /// Boolean value in git's spelling (`true`/`yes`/`on`/`1` and their
    /// negations).
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if the value is not a boolean.
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get(section, key) {
            None => Ok(None),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" | "" => Ok(Some(false)),
                other => Err(Error::invalid_argument(format!(
                    "config {}.{} is not a boolean: {:?}",
                    section, key, other
                ))),
            },
        }
    }

    /// `core.repositoryformatversion`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if the key is missing or not a number.
    pub fn format_version(&self) -> Result<u32> {
        let raw = self
            .get("core", "repositoryformatversion")
            .ok_or_else(|| Error::invalid_argument("config lacks core.repositoryformatversion"))?;
        raw.parse().map_err(|_| {
            Error::invalid_argument(format!("core.repositoryformatversion {:?} is not a number", raw))
        })
    }

    /// Fail unless the format version is [`FORMAT_VERSION`].
    pub fn check_format_version(&self) -> Result<()> {
        let version = self.format_version()?;
        if version != FORMAT_VERSION {
            return Err(Error::invalid_argument(format!(
                "unsupported repositoryformatversion {}",
                version
            )));
        }
        Ok(())
    }

    pub fn filemode(&self) -> Result<bool> {
        Ok(self.get_bool("core", "filemode")?.unwrap_or(false))
    }

    pub fn bare(&self) -> Result<bool> {
        Ok(self.get_bool("core", "bare")?.unwrap_or(false))
    }

    /// Identity from `[user]`, stamped with the current time.
    pub fn user_signature(&self) -> Option<Signature> {
        let name = self.get("user", "name")?;
        let email = self.get("user", "email").unwrap_or("");
        Some(Signature::now(name, email))
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn needs_quotes(value: &str) -> bool {
    value != value.trim() || value.contains(['#', ';'])
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                if needs_quotes(value) {
                    writeln!(f, "\t{} = \"{}\"", key, value)?;
                } else {
                    writeln!(f, "\t{} = {}", key, value)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_core_section() {
        let config = Config::default();
        assert_eq!(config.format_version().unwrap(), 0);
        assert!(!config.filemode().unwrap());
        assert!(!config.bare().unwrap());
        assert_eq!(
            config.to_string(),
            "[core]\n\trepositoryformatversion = 0\n\tfilemode = false\n\tbare = false\n"
        );
    }

    #[test]
    fn parse_keeps_unknown_keys() {
        let text = "# comment\n[core]\n\trepositoryformatversion = 0\n\tFileMode = true\n[extra]\n\tkey = \"spaced value \"\n\tflag\n";
        let config = Config::parse(text).unwrap();
        assert!(config.filemode().unwrap());
        assert_eq!(config.get("extra", "key"), Some("spaced value "));
        assert_eq!(config.get_bool("extra", "flag").unwrap(), Some(true));

        let again = Config::parse(&config.to_string()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut config = Config::default();
        config.set("core", "bare", "true");
        config.set("user", "name", "Ada");
        assert!(config.bare().unwrap());
        assert_eq!(config.get("USER", "Name"), Some("Ada"));
        assert_eq!(config.to_string().matches("bare").count(), 1);
    }

    #[test]
    fn version_check() {
        let config = Config::parse("[core]\nrepositoryformatversion = 1\n").unwrap();
        assert!(matches!(config.check_format_version(), Err(Error::InvalidArgument(_))));
        assert!(Config::parse("[core]\n").unwrap().check_format_version().is_err());
    }

    #[test]
    fn malformed_text() {
        assert!(matches!(Config::parse("key = 1\n"), Err(Error::Corrupt(_))));
        assert!(matches!(Config::parse("[core\n"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn user_signature_requires_name() {
        assert!(Config::default().user_signature().is_none());
        let mut config = Config::default();
        config.set("user", "name", "Ada");
        config.set("user", "email", "ada@example.com");
        let sig = config.user_signature().unwrap();
        assert_eq!(sig.name, "Ada");
        assert_eq!(sig.email, "ada@example.com");
    }
}
