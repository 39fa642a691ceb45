use crate::entities::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SCHEMA_NAME: &str = "public";
pub const DEFAULT_BLOAT_PERCENTAGE_THRESHOLD: f64 = 10.0;
pub const DEFAULT_REMAINING_PERCENTAGE_THRESHOLD: f64 = 10.0;

/// Schema and thresholds every diagnostic of one batch is parameterised with.
///
/// The schema name is stored lowercased; thresholds are percentages in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaContext {
    schema_name: String,
    bloat_percentage_threshold: f64,
    remaining_percentage_threshold: f64,
}

type Result<T, E = ModelError> = std::result::Result<T, E>;

impl SchemaContext {
    pub fn new(
        schema_name: &str,
        bloat_percentage_threshold: f64,
        remaining_percentage_threshold: f64,
    ) -> Result<Self> {
        let schema_name = schema_name.trim();
        if schema_name.is_empty() {
            return Err(ModelError::BlankValue {
                field: "schemaName",
            });
        }
        Ok(Self {
            schema_name: schema_name.to_lowercase(),
            bloat_percentage_threshold: percent(
                bloat_percentage_threshold,
                "bloatPercentageThreshold",
            )?,
            remaining_percentage_threshold: percent(
                remaining_percentage_threshold,
                "remainingPercentageThreshold",
            )?,
        })
    }

    pub fn of(schema_name: &str) -> Result<Self> {
        Self::new(
            schema_name,
            DEFAULT_BLOAT_PERCENTAGE_THRESHOLD,
            DEFAULT_REMAINING_PERCENTAGE_THRESHOLD,
        )
    }

    pub fn public() -> Self {
        Self {
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
            bloat_percentage_threshold: DEFAULT_BLOAT_PERCENTAGE_THRESHOLD,
            remaining_percentage_threshold: DEFAULT_REMAINING_PERCENTAGE_THRESHOLD,
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn bloat_percentage_threshold(&self) -> f64 {
        self.bloat_percentage_threshold
    }

    pub fn remaining_percentage_threshold(&self) -> f64 {
        self.remaining_percentage_threshold
    }

    pub fn is_default_schema(&self) -> bool {
        self.schema_name == DEFAULT_SCHEMA_NAME
    }

    /// Qualifies `object_name` with the schema unless the schema is `public`
    /// or the name already carries the prefix.
    pub fn enrich_with_schema(&self, object_name: &str) -> String {
        if self.is_default_schema() {
            return object_name.to_string();
        }
        let prefix = format!("{}.", self.schema_name);
        if object_name.to_lowercase().starts_with(&prefix) {
            return object_name.to_string();
        }
        format!("{prefix}{object_name}")
    }
}

impl Default for SchemaContext {
    fn default() -> Self {
        Self::public()
    }
}

impl fmt::Display for SchemaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schema={}, bloat>={}%, remaining<={}%",
            self.schema_name, self.bloat_percentage_threshold, self.remaining_percentage_threshold
        )
    }
}

#[derive(Deserialize)]
struct RawSchemaContext {
    #[serde(default = "default_schema")]
    schema_name: String,
    #[serde(default = "default_threshold")]
    bloat_percentage_threshold: f64,
    #[serde(default = "default_threshold")]
    remaining_percentage_threshold: f64,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA_NAME.to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_BLOAT_PERCENTAGE_THRESHOLD
}

impl<'de> Deserialize<'de> for SchemaContext {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSchemaContext::deserialize(deserializer)?;
        SchemaContext::new(
            &raw.schema_name,
            raw.bloat_percentage_threshold,
            raw.remaining_percentage_threshold,
        )
        .map_err(serde::de::Error::custom)
    }
}

fn percent(value: f64, field: &'static str) -> Result<f64> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ModelError::InvalidPercent { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn schema_name_is_normalised() {
        let ctx = SchemaContext::of("  Custom ").unwrap();
        assert_eq!(ctx.schema_name(), "custom");
        assert!(!ctx.is_default_schema());
        assert_eq!(ctx.bloat_percentage_threshold(), 10.0);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_schema_fails(#[case] schema: &str) {
        assert!(matches!(
            SchemaContext::of(schema),
            Err(ModelError::BlankValue { .. })
        ));
    }

    #[rstest]
    #[case(-1.0, 10.0)]
    #[case(10.0, 100.5)]
    #[case(f64::NAN, 10.0)]
    fn thresholds_out_of_range_fail(#[case] bloat: f64, #[case] remaining: f64) {
        assert!(matches!(
            SchemaContext::new("public", bloat, remaining),
            Err(ModelError::InvalidPercent { .. })
        ));
    }

    #[rstest]
    #[case("public", "t1", "t1")]
    #[case("custom", "t1", "custom.t1")]
    #[case("custom", "custom.t1", "custom.t1")]
    #[case("custom", "CUSTOM.t1", "CUSTOM.t1")]
    fn enrich_with_schema(#[case] schema: &str, #[case] name: &str, #[case] expected: &str) {
        let ctx = SchemaContext::of(schema).unwrap();
        assert_eq!(ctx.enrich_with_schema(name), expected);
    }

    #[test]
    fn deserialisation_validates() {
        let ctx: SchemaContext = serde_yaml::from_str("schema_name: demo").unwrap();
        assert_eq!(ctx.schema_name(), "demo");
        assert!(serde_yaml::from_str::<SchemaContext>("bloat_percentage_threshold: 120").is_err());
    }
}
