//! Item identifiers and their allocation.

use std::{
    borrow::Borrow,
    collections::HashSet,
    fmt,
    ops::Deref,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::schema::ConfigError;

/// The identifier of an item.
///
/// Identifiers are compared as plain strings. They need not follow the
/// configured [`IdFormat`]; only identifiers that do are taken into account
/// when allocating new ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates an identifier from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for ItemId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// The configured identifier format.
///
/// Format: `{prefix}{separator}{number}`, where the number is zero-padded to
/// `padding` digits. Numbers wider than `padding` are written in full.
///
/// Examples with prefix `REQ`, separator `-` and padding 4: `REQ-0001`,
/// `REQ-0042`, `REQ-12345`.
#[derive(Debug, Clone)]
pub struct IdFormat {
    prefix: String,
    separator: String,
    padding: usize,
    start: u64,
    pattern: Regex,
}

impl IdFormat {
    /// Creates a format.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix and separator cannot be compiled into a
    /// matching pattern.
    pub fn new(
        prefix: String,
        separator: String,
        padding: usize,
        start: u64,
    ) -> Result<Self, ConfigError> {
        let literal = regex::escape(&format!("{prefix}{separator}"));
        let pattern = Regex::new(&format!("^{literal}([0-9]+)$"))
            .map_err(|e| ConfigError::invalid(format!("idConfig: {e}")))?;
        Ok(Self {
            prefix,
            separator,
            padding,
            start,
            pattern,
        })
    }

    /// The identifier prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The separator between prefix and number.
    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// The minimum number of digits.
    #[must_use]
    pub const fn padding(&self) -> usize {
        self.padding
    }

    /// The first number handed out by a fresh allocator.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Formats a number as an identifier.
    ///
    /// ```
    /// use rigr::domain::identifier::IdFormat;
    ///
    /// let format = IdFormat::new("REQ".into(), "-".into(), 4, 1).unwrap();
    ///
    /// assert_eq!(format.format(1), "REQ-0001");
    /// assert_eq!(format.format(12345), "REQ-12345");
    /// ```
    #[must_use]
    pub fn format(&self, n: u64) -> String {
        format!(
            "{}{}{:0width$}",
            self.prefix,
            self.separator,
            n,
            width = self.padding
        )
    }

    /// Recovers the number from an identifier produced by [`Self::format`].
    ///
    /// Returns `None` for identifiers this format would never produce, such as
    /// `REQ-01` when the padding is 4.
    #[must_use]
    pub fn parse(&self, id: &str) -> Option<u64> {
        let digits = self.pattern.captures(id)?.get(1)?.as_str();
        let n = digits.parse().ok()?;
        (self.format(n) == id).then_some(n)
    }
}

/// Hands out identifiers that are not yet in use.
///
/// The counter never moves backwards: it starts at the configured start
/// value and is pushed past every registered identifier the format
/// recognises. Once it has passed [`u64::MAX`] the allocator is exhausted.
#[derive(Debug, Clone)]
pub struct Allocator<'a> {
    format: &'a IdFormat,
    counter: Option<u64>,
    used: HashSet<ItemId>,
}

impl<'a> Allocator<'a> {
    /// Creates an allocator with no identifiers in use.
    #[must_use]
    pub fn new(format: &'a IdFormat) -> Self {
        Self {
            format,
            counter: Some(format.start()),
            used: HashSet::new(),
        }
    }

    /// Creates an allocator that will not reissue any of the given
    /// identifiers.
    #[must_use]
    pub fn seeded<'i>(format: &'a IdFormat, ids: impl IntoIterator<Item = &'i ItemId>) -> Self {
        let mut allocator = Self::new(format);
        for id in ids {
            allocator.register(id);
        }
        allocator
    }

    /// Marks an identifier as in use.
    ///
    /// Returns `false` if it was already in use.
    pub fn register(&mut self, id: &ItemId) -> bool {
        if let Some(n) = self.format.parse(id) {
            self.counter = self
                .counter
                .zip(n.checked_add(1))
                .map(|(counter, next)| counter.max(next));
        }
        self.used.insert(id.clone())
    }

    /// Whether an identifier is in use.
    #[must_use]
    pub fn is_used(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// The number the next allocation will try first, or `None` once every
    /// number has been handed out.
    #[must_use]
    pub const fn counter(&self) -> Option<u64> {
        self.counter
    }

    /// Allocates the next free identifier.
    ///
    /// Returns `None` when no number is left to allocate.
    pub fn next_id(&mut self) -> Option<ItemId> {
        while let Some(n) = self.counter {
            self.counter = n.checked_add(1);
            let candidate = ItemId::new(self.format.format(n));
            if self.used.insert(candidate.clone()) {
                return Some(candidate);
            }
        }
        None
    }
}
