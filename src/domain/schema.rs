//! The schema registry.
//!
//! A [`Schema`] describes the *shape* of the traceability graph: which object
//! types, levels, statuses and link options exist, how identifiers are
//! formatted, and which free-form attributes are permitted. It is loaded once,
//! validated, and never mutated afterwards. A configuration change means
//! loading a new schema.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    path::Path,
};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::identifier::IdFormat;

/// The category of a [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigErrorKind {
    /// Two entries in the same category share a name.
    DuplicateKey,
    /// A required section or field is absent.
    MissingField,
    /// A field is present but its value is not acceptable.
    InvalidValue,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DuplicateKey => "duplicate key",
            Self::MissingField => "missing field",
            Self::InvalidValue => "invalid value",
        };
        f.write_str(s)
    }
}

/// A fatal configuration error.
///
/// No graph can be built against a schema that failed to load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ConfigError {
    /// What went wrong.
    pub kind: ConfigErrorKind,
    /// The offending key, and what was wrong with it.
    pub detail: String,
}

impl ConfigError {
    pub(crate) fn duplicate(detail: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::DuplicateKey,
            detail: detail.into(),
        }
    }

    pub(crate) fn missing(detail: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::MissingField,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::InvalidValue,
            detail: detail.into(),
        }
    }
}

/// A declared object type, such as `requirement` or `specification`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    /// The value used in an item's `type` field.
    pub name: NonEmptyString,
    /// Display name.
    pub title: String,
}

/// A declared abstraction level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    /// The value used in an item's `level` field.
    pub name: NonEmptyString,
    /// Display name.
    pub title: String,
}

/// A declared link option.
///
/// One stored edge carries both readings: `outgoing` labels the edge as seen
/// from its source, `incoming` labels it as seen from its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkType {
    /// The option name used on the declaring item (e.g. `satisfies`).
    pub option: NonEmptyString,
    /// Label for the reverse reading (e.g. `satisfied_by`).
    pub incoming: NonEmptyString,
    /// Label for the forward reading (e.g. `satisfies`).
    pub outgoing: NonEmptyString,
    /// Renderer style hint, passed through verbatim.
    pub style: Option<String>,
    /// Whether edges of this option must never form a cycle.
    pub acyclic: bool,
}

/// A declared lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The value used in an item's `status` field.
    pub name: NonEmptyString,
    /// Renderer colour hint, passed through verbatim.
    pub color: Option<String>,
}

/// Which reading of a link is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From the declaring item towards its target.
    Outgoing,
    /// From the target back towards the declaring item.
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outgoing => f.write_str("outgoing"),
            Self::Incoming => f.write_str("incoming"),
        }
    }
}

/// The validated, immutable configuration of a traceability graph.
#[derive(Debug, Clone)]
pub struct Schema {
    object_types: Vec<ObjectType>,
    type_index: HashMap<String, usize>,

    /// Ordered; the index is the level's rank (lower = more abstract).
    levels: Vec<Level>,
    level_index: HashMap<String, usize>,

    link_types: Vec<LinkType>,
    link_index: HashMap<String, usize>,

    /// Label → every (link type, reading) that uses it.
    labels: HashMap<String, Vec<(usize, Direction)>>,

    statuses: Vec<Status>,
    status_index: HashMap<String, usize>,
    default_status: usize,

    id_format: IdFormat,
    extra_options: BTreeSet<String>,
}

/// Attribute names every item may carry regardless of `extraOptions`.
pub const CORE_ATTRIBUTES: [&str; 2] = ["title", "content"];

impl Schema {
    /// Loads a schema from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::InvalidValue`] if the file cannot be read or
    /// parsed, and any error raised while validating the schema.
    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::invalid(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates a schema written as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or the schema is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawSchema = toml::from_str(content)
            .map_err(|e| ConfigError::invalid(format!("failed to parse schema: {e}")))?;
        raw.try_into()
    }

    /// Parses and validates a schema written as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or the schema is invalid.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawSchema = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::invalid(format!("failed to parse schema: {e}")))?;
        raw.try_into()
    }

    /// Parses and validates a schema written as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the schema is invalid.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let raw: RawSchema = serde_json::from_str(content)
            .map_err(|e| ConfigError::invalid(format!("failed to parse schema: {e}")))?;
        raw.try_into()
    }

    /// The declared object types, in declaration order.
    #[must_use]
    pub fn object_types(&self) -> &[ObjectType] {
        &self.object_types
    }

    /// Looks up an object type by name.
    #[must_use]
    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.type_index.get(name).map(|&i| &self.object_types[i])
    }

    /// The declared levels, most abstract first.
    #[must_use]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Looks up a level by name.
    #[must_use]
    pub fn level(&self, name: &str) -> Option<&Level> {
        self.level_index.get(name).map(|&i| &self.levels[i])
    }

    /// The rank of a level. Lower ranks are more abstract.
    #[must_use]
    pub fn level_rank(&self, name: &str) -> Option<usize> {
        self.level_index.get(name).copied()
    }

    /// The declared link types, in declaration order.
    #[must_use]
    pub fn link_types(&self) -> &[LinkType] {
        &self.link_types
    }

    /// Looks up a link type by option name.
    #[must_use]
    pub fn link_type(&self, option: &str) -> Option<&LinkType> {
        self.link_index.get(option).map(|&i| &self.link_types[i])
    }

    /// Resolves a link label to the link types and readings that use it.
    ///
    /// Forward readings are listed before reverse readings. A type whose
    /// `incoming` and `outgoing` labels coincide appears once per reading.
    #[must_use]
    pub fn resolve_label(&self, label: &str) -> Vec<(&LinkType, Direction)> {
        let Some(uses) = self.labels.get(label) else {
            return Vec::new();
        };
        let mut resolved: Vec<_> = uses
            .iter()
            .map(|&(i, direction)| (&self.link_types[i], direction))
            .collect();
        resolved.sort_by_key(|(_, direction)| *direction);
        resolved
    }

    /// The options marked as required-acyclic in the schema.
    pub fn acyclic_options(&self) -> impl Iterator<Item = &str> {
        self.link_types
            .iter()
            .filter(|link| link.acyclic)
            .map(|link| link.option.as_str())
    }

    /// The declared statuses, in declaration order.
    #[must_use]
    pub fn statuses(&self) -> &[Status] {
        &self.statuses
    }

    /// Looks up a status by name.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<&Status> {
        self.status_index.get(name).map(|&i| &self.statuses[i])
    }

    /// The status given to items that do not declare one.
    #[must_use]
    pub fn default_status(&self) -> &Status {
        &self.statuses[self.default_status]
    }

    /// The colour hint for a status, if one is configured.
    #[must_use]
    pub fn status_color(&self, name: &str) -> Option<&str> {
        self.status(name).and_then(|status| status.color.as_deref())
    }

    /// The identifier format.
    #[must_use]
    pub const fn id_format(&self) -> &IdFormat {
        &self.id_format
    }

    /// The permitted free-form attribute names.
    #[must_use]
    pub const fn extra_options(&self) -> &BTreeSet<String> {
        &self.extra_options
    }

    /// Whether an item may carry the given attribute.
    #[must_use]
    pub fn is_attribute_allowed(&self, name: &str) -> bool {
        CORE_ATTRIBUTES.contains(&name) || self.extra_options.contains(name)
    }
}

/// Collects named entries into a name → index map, rejecting blank and
/// repeated names.
fn index_names<'a>(
    section: &str,
    field: &str,
    names: impl IntoIterator<Item = Option<&'a str>>,
) -> Result<(Vec<NonEmptyString>, HashMap<String, usize>), ConfigError> {
    let mut validated = Vec::new();
    let mut index = HashMap::new();
    for (i, name) in names.into_iter().enumerate() {
        let name = required(section, i, field, name)?;
        if index.insert(name.as_str().to_string(), i).is_some() {
            return Err(ConfigError::duplicate(format!(
                "{section}: {field} '{name}' is declared more than once"
            )));
        }
        validated.push(name);
    }
    Ok((validated, index))
}

fn required(
    section: &str,
    index: usize,
    field: &str,
    value: Option<&str>,
) -> Result<NonEmptyString, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::missing(format!("{section}[{index}].{field}")))?;
    NonEmptyString::new(value.trim().to_string())
        .map_err(|_| ConfigError::invalid(format!("{section}[{index}].{field} must not be empty")))
}

impl TryFrom<RawSchema> for Schema {
    type Error = ConfigError;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        let raw_types = raw
            .object_types
            .ok_or_else(|| ConfigError::missing("objectTypes"))?;
        let raw_links = raw
            .link_types
            .ok_or_else(|| ConfigError::missing("linkTypes"))?;
        let raw_statuses = raw
            .statuses
            .ok_or_else(|| ConfigError::missing("statuses"))?;
        let raw_id = raw.id_config.ok_or_else(|| ConfigError::missing("idConfig"))?;

        let (type_names, type_index) = index_names(
            "objectTypes",
            "type",
            raw_types.iter().map(|t| t.kind.as_deref()),
        )?;
        let object_types = type_names
            .into_iter()
            .zip(raw_types)
            .map(|(name, raw)| ObjectType {
                title: raw.title.unwrap_or_else(|| name.to_string()),
                name,
            })
            .collect();

        let (level_names, level_index) = index_names(
            "levels",
            "level",
            raw.levels.iter().map(|l| l.level.as_deref()),
        )?;
        let levels = level_names
            .into_iter()
            .zip(raw.levels)
            .map(|(name, raw)| Level {
                title: raw.title.unwrap_or_else(|| name.to_string()),
                name,
            })
            .collect();

        let (options, link_index) = index_names(
            "linkTypes",
            "option",
            raw_links.iter().map(|l| l.option.as_deref()),
        )?;
        let mut link_types = Vec::with_capacity(options.len());
        let mut labels: HashMap<String, Vec<(usize, Direction)>> = HashMap::new();
        for (i, (option, raw)) in options.into_iter().zip(raw_links).enumerate() {
            let incoming = required("linkTypes", i, "incoming", raw.incoming.as_deref())?;
            let outgoing = required("linkTypes", i, "outgoing", raw.outgoing.as_deref())?;
            labels
                .entry(outgoing.to_string())
                .or_default()
                .push((i, Direction::Outgoing));
            labels
                .entry(incoming.to_string())
                .or_default()
                .push((i, Direction::Incoming));
            link_types.push(LinkType {
                option,
                incoming,
                outgoing,
                style: raw.style,
                acyclic: raw.acyclic,
            });
        }

        if raw_statuses.is_empty() {
            return Err(ConfigError::invalid(
                "statuses must declare at least one status",
            ));
        }
        let (status_names, status_index) = index_names(
            "statuses",
            "status",
            raw_statuses.iter().map(|s| s.status.as_deref()),
        )?;
        let statuses: Vec<Status> = status_names
            .into_iter()
            .zip(raw_statuses)
            .map(|(name, raw)| Status {
                name,
                color: raw.color,
            })
            .collect();
        let default_status = match raw.default_status.as_deref().map(str::trim) {
            None => 0,
            Some(name) => *status_index.get(name).ok_or_else(|| {
                ConfigError::invalid(format!(
                    "defaultStatus '{name}' is not a declared status"
                ))
            })?,
        };

        let padding = non_negative("idConfig.padding", raw_id.padding)?;
        let start = non_negative("idConfig.start", raw_id.start)?;
        let id_format = IdFormat::new(
            raw_id.prefix.unwrap_or_default(),
            raw_id.separator.unwrap_or_default(),
            usize::try_from(padding)
                .map_err(|_| ConfigError::invalid("idConfig.padding is too large"))?,
            start,
        )?;

        let mut extra_options = BTreeSet::new();
        for (i, option) in raw.extra_options.into_iter().enumerate() {
            let option = option.trim().to_string();
            if option.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "extraOptions[{i}] must not be empty"
                )));
            }
            if !extra_options.insert(option.clone()) {
                return Err(ConfigError::duplicate(format!(
                    "extraOptions: '{option}' is declared more than once"
                )));
            }
        }

        Ok(Self {
            object_types,
            type_index,
            levels,
            level_index,
            link_types,
            link_index,
            labels,
            statuses,
            status_index,
            default_status,
            id_format,
            extra_options,
        })
    }
}

fn non_negative(key: &str, value: Option<i64>) -> Result<u64, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::missing(key))?;
    u64::try_from(value).map_err(|_| ConfigError::invalid(format!("{key} must be >= 0, got {value}")))
}

/// The configuration as written by the user, before validation.
///
/// Both the camel-case names and the `rigr_`-prefixed names used by the
/// documentation extension are accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    #[serde(alias = "rigr_object_types", alias = "object_types")]
    object_types: Option<Vec<RawObjectType>>,

    #[serde(default, alias = "rigr_levels")]
    levels: Vec<RawLevel>,

    #[serde(alias = "rigr_id_config", alias = "id_config")]
    id_config: Option<RawIdConfig>,

    #[serde(alias = "rigr_link_types", alias = "link_types")]
    link_types: Option<Vec<RawLinkType>>,

    #[serde(alias = "rigr_statuses")]
    statuses: Option<Vec<RawStatus>>,

    #[serde(alias = "rigr_default_status", alias = "default_status")]
    default_status: Option<String>,

    #[serde(default, alias = "rigr_extra_options", alias = "extra_options")]
    extra_options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawObjectType {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    level: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLinkType {
    option: Option<String>,
    incoming: Option<String>,
    outgoing: Option<String>,
    style: Option<String>,
    #[serde(default)]
    acyclic: bool,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    status: Option<String>,
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIdConfig {
    prefix: Option<String>,
    separator: Option<String>,
    padding: Option<i64>,
    start: Option<i64>,
}
