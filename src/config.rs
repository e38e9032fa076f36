//! A registry-based loader for plain-text configuration files.
//!
//! A config file is a flat list of whitespace-separated `key value`
//! records. Components register their keys as `(key, description,
//! parse-fn)` entries in a [`PropertyRegistry`] over their own options
//! struct; the loader walks the file and dispatches each key to the
//! matching entry. Pair-valued (`lo hi`) and comma-separated list
//! values are first-class parse helpers rather than ad-hoc overloads.

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::str::SplitWhitespace;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the config file \"{path}\" is invalid or unreadable")]
    BadFile { path: String },
    #[error("the key \"{key}\" is not registered here")]
    UnknownKey { key: String },
    #[error("invalid value for key \"{key}\": {message}")]
    InvalidValue { key: String, message: String },
}

/// Cursor over the whitespace-separated tokens of a config file.
pub struct Tokens<'a> {
    iter: SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Tokens<'a> {
        Tokens {
            iter: input.split_whitespace(),
        }
    }

    fn next_token(&mut self, key: &str) -> Result<&'a str, ConfigError> {
        self.iter.next().ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_owned(),
            message: "missing value".to_owned(),
        })
    }

    /// Parses the next token as a single value.
    pub fn parse_value<V>(&mut self, key: &str) -> Result<V, ConfigError>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
    {
        let token = self.next_token(key)?;
        token.parse().map_err(|err| ConfigError::InvalidValue {
            key: key.to_owned(),
            message: format!("\"{token}\": {err}"),
        })
    }

    /// Parses the next two tokens as an inclusive `lo hi` range.
    pub fn parse_pair<V>(&mut self, key: &str) -> Result<(V, V), ConfigError>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
    {
        Ok((self.parse_value(key)?, self.parse_value(key)?))
    }

    /// Parses the next token as a comma-separated list.
    pub fn parse_list<V>(&mut self, key: &str) -> Result<Vec<V>, ConfigError>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
    {
        let token = self.next_token(key)?;
        token
            .split(',')
            .map(|item| {
                item.parse().map_err(|err| ConfigError::InvalidValue {
                    key: key.to_owned(),
                    message: format!("\"{item}\": {err}"),
                })
            })
            .collect()
    }

    /// Parses the next token as a boolean; accepts `0`, `1`, `false`
    /// and `true`.
    pub fn parse_bool(&mut self, key: &str) -> Result<bool, ConfigError> {
        let token = self.next_token(key)?;
        match token {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(ConfigError::InvalidValue {
                key: key.to_owned(),
                message: format!("\"{other}\" is not a boolean"),
            }),
        }
    }
}

type ParseFn<T> = fn(&mut T, &mut Tokens<'_>) -> Result<(), ConfigError>;

struct PropertyEntry<T> {
    key: &'static str,
    description: &'static str,
    parse: ParseFn<T>,
}

/// The registered keys of one options struct `T`.
pub struct PropertyRegistry<T> {
    entries: Vec<PropertyEntry<T>>,
}

impl<T> Default for PropertyRegistry<T> {
    fn default() -> Self {
        PropertyRegistry::new()
    }
}

impl<T> PropertyRegistry<T> {
    pub fn new() -> PropertyRegistry<T> {
        PropertyRegistry {
            entries: Vec::new(),
        }
    }

    /// Registers a property under `key`. The parse function pulls the
    /// value tokens from the cursor and writes the target field.
    pub fn register(&mut self, key: &'static str, description: &'static str, parse: ParseFn<T>) {
        self.entries.push(PropertyEntry {
            key,
            description,
            parse,
        });
    }

    /// Reads the config file at `path` into `target`.
    ///
    /// Unknown keys raise [`ConfigError::UnknownKey`] unless
    /// `skip_unknown` is set, in which case the key is ignored (its
    /// value tokens then parse as further unknown keys and are skipped
    /// in turn).
    pub fn parse_config(
        &self,
        target: &mut T,
        path: &Path,
        skip_unknown: bool,
    ) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(path).map_err(|_| ConfigError::BadFile {
            path: path.display().to_string(),
        })?;

        if contents.trim().is_empty() {
            return Err(ConfigError::BadFile {
                path: path.display().to_string(),
            });
        }

        self.parse_str(target, &contents, skip_unknown)
    }

    /// Reads config records from an in-memory string; the file-less
    /// seam used by tests.
    pub fn parse_str(
        &self,
        target: &mut T,
        input: &str,
        skip_unknown: bool,
    ) -> Result<(), ConfigError> {
        let mut tokens = Tokens::new(input);

        while let Some(key) = tokens.iter.next() {
            match self.entries.iter().find(|entry| entry.key == key) {
                Some(entry) => (entry.parse)(target, &mut tokens)?,
                None if skip_unknown => continue,
                None => {
                    return Err(ConfigError::UnknownKey {
                        key: key.to_owned(),
                    })
                }
            }
        }

        Ok(())
    }

    /// Prints the keys and descriptions of all registered properties as
    /// an aligned table.
    pub fn print_help(&self, out: &mut impl Write) -> io::Result<()> {
        let width = self
            .entries
            .iter()
            .map(|entry| entry.key.len())
            .max()
            .unwrap_or(0);

        for entry in &self.entries {
            writeln!(out, "{:>width$}: {}", entry.key, entry.description)?;
        }

        Ok(())
    }
}
