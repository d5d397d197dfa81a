use core::fmt;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROJECT: &str = "default";

/// A `(type, value)` label. The pair is the natural key, there is no id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub value: String,
}

impl Tag {
    pub fn new(tag_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag_type: tag_type.into(),
            value: value.into(),
        }
    }

    /// Parses the `type:value` form used by the `tag` query filter.
    pub fn parse_filter(raw: &str) -> Option<Self> {
        let (tag_type, value) = raw.split_once(':')?;
        if tag_type.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(tag_type, value))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag_type, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToggleType {
    #[default]
    Release,
    Experiment,
    Operational,
    KillSwitch,
    Permission,
}

impl fmt::Display for ToggleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleType::Release => write!(f, "release"),
            ToggleType::Experiment => write!(f, "experiment"),
            ToggleType::Operational => write!(f, "operational"),
            ToggleType::KillSwitch => write!(f, "kill-switch"),
            ToggleType::Permission => write!(f, "permission"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintOperator {
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub context_name: String,
    pub operator: ConstraintOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A named activation rule. Parameters are opaque to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl Strategy {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            constraints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightType {
    #[default]
    Variable,
    Fix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub payload_type: PayloadType,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    String,
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub context_name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Total weight shared by the variants of one toggle.
pub const VARIANT_WEIGHT_TOTAL: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub name: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub weight_type: WeightType,
    #[serde(default = "default_stickiness")]
    pub stickiness: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Override>,
}

impl Variant {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 0,
            weight_type: WeightType::Variable,
            stickiness: default_stickiness(),
            payload: None,
            overrides: Vec::new(),
        }
    }
}

fn default_stickiness() -> String {
    "default".to_string()
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

/// The body accepted by create and update. The name may be omitted on
/// update, where the path wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub toggle_type: ToggleType,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl FeatureDefinition {
    /// A definition with a single `default` strategy, the minimum that passes
    /// validation.
    pub fn with_default_strategy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: default_project(),
            strategies: vec![Strategy::named("default")],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub toggle_type: ToggleType,
    #[serde(default = "default_project")]
    pub project: String,
    pub enabled: bool,
    #[serde(default)]
    pub stale: bool,
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

impl FeatureToggle {
    pub fn from_definition(definition: FeatureDefinition, created_at: DateTime<Utc>) -> Self {
        Self {
            name: definition.name,
            description: definition.description,
            toggle_type: definition.toggle_type,
            project: definition.project,
            enabled: definition.enabled,
            stale: definition.stale,
            strategies: definition.strategies,
            variants: definition.variants,
            created_at,
            archived: false,
        }
    }

    /// Replaces the definition while keeping identity and creation time.
    pub fn apply(&mut self, definition: FeatureDefinition) {
        self.description = definition.description;
        self.toggle_type = definition.toggle_type;
        self.project = definition.project;
        self.enabled = definition.enabled;
        self.stale = definition.stale;
        self.strategies = definition.strategies;
        self.variants = definition.variants;
    }
}

impl From<&FeatureToggle> for FeatureDefinition {
    fn from(toggle: &FeatureToggle) -> Self {
        Self {
            name: toggle.name.clone(),
            description: toggle.description.clone(),
            toggle_type: toggle.toggle_type,
            project: toggle.project.clone(),
            enabled: toggle.enabled,
            stale: toggle.stale,
            strategies: toggle.strategies.clone(),
            variants: toggle.variants.clone(),
        }
    }
}

/// Where an existing name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameState {
    Active,
    Archived,
}

/// Filters for listing active toggles. Empty lists mean "no filter"; several
/// tags or projects match any of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureQuery {
    pub name_prefix: Option<String>,
    pub tags: Vec<Tag>,
    pub projects: Vec<String>,
}

impl FeatureQuery {
    pub fn matches_name_and_project(&self, toggle: &FeatureToggle) -> bool {
        if let Some(prefix) = &self.name_prefix {
            if !toggle.name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.projects.is_empty() || self.projects.iter().any(|p| *p == toggle.project)
    }

    pub fn matches_tags(&self, toggle_tags: &[Tag]) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|t| toggle_tags.contains(t))
    }
}
