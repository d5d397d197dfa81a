use core::fmt;
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{FeatureDefinition, Tag, Variant, WeightType, VARIANT_WEIGHT_TOTAL};

const NAME_MAX_LEN: usize = 100;
const TAG_MIN_LEN: usize = 2;
const TAG_MAX_LEN: usize = 50;

/// Names taken by static admin routes under `/api/admin/features/`.
const RESERVED_NAMES: &[&str] = &["validate"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

/// Every problem found in one input, in the order they were found.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationError {
    pub details: Vec<ErrorDetail>,
}

impl ValidationError {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            details: vec![ErrorDetail {
                message: message.into(),
            }],
        }
    }

    fn push(&mut self, message: impl Into<String>) {
        self.details.push(ErrorDetail {
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<(), ValidationError> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.details.iter().map(|d| d.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

fn url_friendly_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // characters left untouched by URI component encoding
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-_.!~*'()]+$").expect("static pattern"))
}

pub fn is_url_friendly(value: &str) -> bool {
    value != "." && value != ".." && url_friendly_pattern().is_match(value)
}

fn check_name(field: &str, value: &str, errors: &mut ValidationError) {
    if value.is_empty() {
        errors.push(format!("\"{field}\" is not allowed to be empty"));
        return;
    }
    if !is_url_friendly(value) {
        errors.push(format!("\"{field}\" must be URL friendly"));
    }
}

/// Checks a toggle name on its own, as the validate endpoint does.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    check_name("name", name, &mut errors);
    if name.chars().count() > NAME_MAX_LEN {
        errors.push(format!(
            "\"name\" length must be less than or equal to {NAME_MAX_LEN} characters long"
        ));
    }
    if RESERVED_NAMES.contains(&name) {
        errors.push(format!("\"name\" {name} is reserved"));
    }
    errors.into_result()
}

pub fn validate_feature(definition: &FeatureDefinition) -> Result<(), ValidationError> {
    let mut errors = match validate_name(&definition.name) {
        Ok(()) => ValidationError::default(),
        Err(e) => e,
    };

    if definition.project.is_empty() {
        errors.push("\"project\" is not allowed to be empty");
    } else if !is_url_friendly(&definition.project) {
        errors.push("\"project\" must be URL friendly");
    }

    if definition.strategies.is_empty() {
        errors.push("\"strategies\" must contain at least 1 items");
    }
    for (i, strategy) in definition.strategies.iter().enumerate() {
        if strategy.name.is_empty() {
            errors.push(format!("\"strategies\" position {i} \"name\" is not allowed to be empty"));
        }
    }

    let mut seen = HashSet::new();
    for (i, variant) in definition.variants.iter().enumerate() {
        if variant.name.is_empty() {
            errors.push(format!("\"variants\" position {i} \"name\" is not allowed to be empty"));
        } else if !seen.insert(variant.name.as_str()) {
            errors.push(format!("\"variants\" position {i} contains a duplicate value"));
        }
        if variant.weight > VARIANT_WEIGHT_TOTAL {
            errors.push(format!(
                "\"variants\" position {i} \"weight\" must be less than or equal to {VARIANT_WEIGHT_TOTAL}"
            ));
        }
    }

    let fixed: u32 = definition
        .variants
        .iter()
        .filter(|v| v.weight_type == WeightType::Fix)
        .map(|v| v.weight)
        .sum();
    let has_variable = definition
        .variants
        .iter()
        .any(|v| v.weight_type == WeightType::Variable);
    if fixed > VARIANT_WEIGHT_TOTAL
        || (!definition.variants.is_empty() && !has_variable && fixed != VARIANT_WEIGHT_TOTAL)
    {
        errors.push("The traffic distribution total must equal 100%");
    }

    errors.into_result()
}

pub fn validate_tag(tag: &Tag) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    check_name("type", &tag.tag_type, &mut errors);
    check_length("type", &tag.tag_type, &mut errors);
    check_length("value", tag.value.trim(), &mut errors);
    errors.into_result()
}

fn check_length(field: &str, value: &str, errors: &mut ValidationError) {
    let len = value.chars().count();
    if len < TAG_MIN_LEN {
        errors.push(format!(
            "\"{field}\" length must be at least {TAG_MIN_LEN} characters long"
        ));
    } else if len > TAG_MAX_LEN {
        errors.push(format!(
            "\"{field}\" length must be less than or equal to {TAG_MAX_LEN} characters long"
        ));
    }
}

/// Spreads the weight left over by `fix` variants across the `variable`
/// ones. Assumes the variants already passed [`validate_feature`].
pub fn fix_variant_weights(variants: &mut [Variant]) {
    let fixed: u32 = variants
        .iter()
        .filter(|v| v.weight_type == WeightType::Fix)
        .map(|v| v.weight)
        .sum();
    let variable_count = variants
        .iter()
        .filter(|v| v.weight_type == WeightType::Variable)
        .count() as u32;
    if variable_count == 0 {
        return;
    }

    let available = VARIANT_WEIGHT_TOTAL.saturating_sub(fixed);
    let share = available / variable_count;
    let mut remainder = available % variable_count;
    for variant in variants
        .iter_mut()
        .filter(|v| v.weight_type == WeightType::Variable)
    {
        variant.weight = share;
        if remainder > 0 {
            variant.weight += 1;
            remainder -= 1;
        }
    }
}
