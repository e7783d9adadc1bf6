//! Ordered step lists, loaded from TOML files or `kind:key=value,...` strings.
//!
//! A recipe file is a list of `[[steps]]` tables, each tagged by `kind`:
//!
//! ```toml
//! [[steps]]
//! kind = "resize"
//! percent = 50
//!
//! [[steps]]
//! kind = "convert"
//! format = "jpeg"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::stages::{StageContext, TransformSpec};
use crate::error::{ConfigError, PipelineError, PipelineResult, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub steps: Vec<TransformSpec>,
}

impl Recipe {
    pub fn new(steps: Vec<TransformSpec>) -> Self {
        Self { steps }
    }

    /// Load a recipe file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let recipe: Recipe = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        tracing::debug!("Loaded {} step(s) from {:?}", recipe.steps.len(), path);
        Ok(recipe)
    }

    /// Append steps parsed from `kind:key=value,...` strings.
    pub fn extend_from_args<S: AsRef<str>>(&mut self, args: &[S]) -> PipelineResult<()> {
        for arg in args {
            self.steps.push(parse_step(arg.as_ref())?);
        }
        Ok(())
    }

    /// Check every step's parameters before any item is processed.
    pub fn validate(&self, ctx: &StageContext) -> PipelineResult<()> {
        for step in &self.steps {
            step.validate(ctx)?;
        }
        Ok(())
    }

    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Fields that always hold text, even when the value looks like a number.
const STRING_FIELDS: &[&str] = &["text", "color", "format", "preset"];

/// Parse one step from `kind:key=value,key=value`.
///
/// Values are read as booleans, integers, or floats when they look like one
/// and as strings otherwise. A pair such as `sample=10;20` becomes an array.
/// A double-quoted value is taken verbatim, so `text="Hello, world"` keeps its
/// comma.
pub fn parse_step(input: &str) -> PipelineResult<TransformSpec> {
    let (kind, params) = match input.split_once(':') {
        Some((kind, params)) => (kind.trim(), params),
        None => (input.trim(), ""),
    };
    if kind.is_empty() {
        return Err(PipelineError::invalid("recipe", format!("missing step kind in {input:?}")));
    }

    let mut table = toml::Table::new();
    table.insert("kind".to_string(), toml::Value::String(kind.to_string()));
    for pair in split_pairs(params)? {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            PipelineError::invalid("recipe", format!("expected key=value, got {pair:?}"))
        })?;
        let key = key.trim().replace('-', "_");
        let value = value.trim();
        let value = match unquote(value) {
            Some(text) => toml::Value::String(text.to_string()),
            None if STRING_FIELDS.contains(&key.as_str()) => {
                toml::Value::String(value.to_string())
            }
            None => parse_value(value),
        };
        table.insert(key, value);
    }

    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| {
            PipelineError::invalid("recipe", format!("step {input:?}: {}", e.message()))
        })
}

/// Split on commas that are not inside double quotes.
fn split_pairs(params: &str) -> PipelineResult<Vec<&str>> {
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in params.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                pairs.push(&params[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return Err(PipelineError::invalid(
            "recipe",
            format!("unterminated quote in {params:?}"),
        ));
    }
    pairs.push(&params[start..]);
    Ok(pairs
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect())
}

fn unquote(value: &str) -> Option<&str> {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
}

fn parse_value(raw: &str) -> toml::Value {
    if raw.contains(';') {
        return toml::Value::Array(raw.split(';').map(|v| parse_value(v.trim())).collect());
    }
    if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::{ColorKeySpec, FilterSpec, ResizeSpec, WatermarkSpec};

    #[test]
    fn parses_step_strings() {
        assert_eq!(
            parse_step("resize:percent=50").unwrap(),
            TransformSpec::Resize(ResizeSpec::percent(50.0))
        );

        let spec = parse_step("filter:effect=contrast,amount=1.5").unwrap();
        assert_eq!(spec, TransformSpec::Filter(FilterSpec::Contrast { amount: 1.5 }));

        let spec = parse_step("watermark:text=hello world,position=top-left,font-size=16").unwrap();
        match spec {
            TransformSpec::Watermark(WatermarkSpec {
                text, font_size, ..
            }) => {
                assert_eq!(text, "hello world");
                assert_eq!(font_size, Some(16));
            }
            other => panic!("unexpected {other:?}"),
        }

        let spec = parse_step("remove-bg:sample=3;4,tolerance=0").unwrap();
        assert_eq!(
            spec,
            TransformSpec::ColorKeyRemove(ColorKeySpec {
                sample: Some((3, 4)),
                tolerance: 0,
                ..ColorKeySpec::default()
            })
        );
    }

    #[test]
    fn text_values_stay_strings() {
        let spec = parse_step("watermark:text=2024,color=#000000").unwrap();
        match spec {
            TransformSpec::Watermark(WatermarkSpec { text, .. }) => assert_eq!(text, "2024"),
            other => panic!("unexpected {other:?}"),
        }

        let spec = parse_step(r#"watermark:text="Hello, world",opacity=1"#).unwrap();
        match spec {
            TransformSpec::Watermark(WatermarkSpec { text, opacity, .. }) => {
                assert_eq!(text, "Hello, world");
                assert_eq!(opacity, 1.0);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(parse_step(r#"watermark:text="open"#).is_err());
    }

    #[test]
    fn rejects_malformed_steps() {
        assert!(parse_step("").is_err());
        assert!(parse_step("resize:percent").is_err());
        assert!(parse_step("sharpen:amount=2").is_err());
        assert!(parse_step("crop:x=1").is_err());
    }

    #[test]
    fn loads_recipe_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.toml");
        std::fs::write(
            &path,
            r#"
            [[steps]]
            kind = "resize"
            width = 1280

            [[steps]]
            kind = "compress"
            quality = 0.8
            format = "webp"
            "#,
        )
        .unwrap();

        let recipe = Recipe::load(&path).unwrap();
        assert_eq!(recipe.steps.len(), 2);
        assert_eq!(recipe.steps[0].kind(), "resize");
        assert_eq!(recipe.steps[1].kind(), "compress");
        assert!(recipe.validate(&StageContext::default()).is_ok());

        let round_trip: Recipe = toml::from_str(&recipe.to_toml().unwrap()).unwrap();
        assert_eq!(round_trip, recipe);
    }

    #[test]
    fn validate_reports_first_bad_step() {
        let mut recipe = Recipe::default();
        recipe
            .extend_from_args(&["rotate:degrees=90", "filter:effect=blur,radius=500"])
            .unwrap();
        let err = recipe.validate(&StageContext::default()).unwrap_err();
        assert!(err.to_string().contains("radius"));
    }
}
