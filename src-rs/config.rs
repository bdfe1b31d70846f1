//! Tunables and the selections project file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::grid::OccupantPrecedence;
use crate::selection::SelectionRecord;

pub const DEFAULT_DISPLAY_WIDTH: u32 = 640;
pub const OUT_DIR_ENV: &str = "TABLE_SLICER_OUT_DIR";

pub const PROJECT_HELP: &str = r##"Selections JSON schema:
{
  "defaults": {
    "display_width": 640,
    "jpeg_quality": 90,
    "handle_radius": 8,
    "min_drag": 5,
    "precedence": "first_created",
    "max_table_width": 640
  },
  "selections": [
    {"kind": "link", "x": 50, "y": 0, "width": 100, "height": 100, "url": "https://example.com"},
    {"kind": "replace", "x": 0, "y": 120, "width": 200, "height": 40,
     "text": "Spring sale", "text_align": "center", "font_size": "18px",
     "background_color": "#1d3557", "text_color": "#ffffff"}
  ]
}

Notes:
- a bare array of selections is accepted too.
- coordinates are original-image pixels; width/height must be positive.
- font_size must be a number followed by px, em or rem.
- camelCase keys (textAlign, fontSize, backgroundColor, textColor) are accepted.
- when selections overlap, precedence picks which one owns the shared cells.
"##;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicerConfig {
    /// Width of the editing canvas; the image is scaled to fit it.
    pub display_width: u32,
    pub jpeg_quality: u8,
    /// Hit radius for resize handles, canvas pixels.
    pub handle_radius: f64,
    /// Drafts must exceed this in both directions to be committed.
    pub min_drag: f64,
    pub precedence: OccupantPrecedence,
    /// `max-width` of the outer table, in CSS pixels.
    pub max_table_width: u32,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            display_width: DEFAULT_DISPLAY_WIDTH,
            jpeg_quality: 90,
            handle_radius: 8.0,
            min_drag: 5.0,
            precedence: OccupantPrecedence::FirstCreated,
            max_table_width: DEFAULT_DISPLAY_WIDTH,
        }
    }
}

impl SlicerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display_width == 0 {
            return Err(ConfigError::ZeroDisplayWidth);
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }
        Ok(())
    }
}

/// Parsed selections file.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub config: SlicerConfig,
    pub selections: Vec<SelectionRecord>,
}

#[derive(Debug, Serialize)]
struct ProjectOut<'a> {
    defaults: &'a SlicerConfig,
    selections: &'a [SelectionRecord],
}

impl Project {
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(ProjectOut {
            defaults: &self.config,
            selections: &self.selections,
        })?)
    }
}

/// Read a JSON document from `path`, or stdin when `path` is `-`.
pub fn read_json_input(path: &str, what: &str) -> Result<Value> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .with_context(|| format!("failed to read {what} from stdin"))?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {what} file: {path}"))?
    };
    serde_json::from_str(&raw).with_context(|| format!("invalid {what} JSON"))
}

pub fn load_project(path: &str) -> Result<Project> {
    parse_project(read_json_input(path, "selections")?)
}

pub fn parse_project(value: Value) -> Result<Project> {
    let (defaults, selections) = match value {
        Value::Array(arr) => (Value::Object(Map::new()), Value::Array(arr)),
        Value::Object(mut obj) => {
            let Some(selections) = obj.remove("selections") else {
                bail!("selections file must be a list or an object with 'selections'");
            };
            let defaults = obj
                .remove("defaults")
                .unwrap_or_else(|| Value::Object(Map::new()));
            (defaults, selections)
        }
        _ => bail!("selections file must be a list or an object with 'selections'"),
    };

    let config: SlicerConfig =
        serde_json::from_value(defaults).context("invalid 'defaults' in selections file")?;
    config.validate()?;

    let Value::Array(items) = selections else {
        bail!("'selections' must be a list");
    };
    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let record: SelectionRecord = serde_json::from_value(item)
            .with_context(|| format!("invalid selection #{}", idx + 1))?;
        records.push(record);
    }

    Ok(Project {
        config,
        selections: records,
    })
}

/// Output root: explicit flag, then the environment, then `.table-slicer`.
pub fn out_root(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| {
            env::var(OUT_DIR_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(".table-slicer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionContent;
    use serde_json::json;

    #[test]
    fn bare_list_uses_default_config() {
        let project = parse_project(json!([
            {"kind": "link", "x": 0, "y": 0, "width": 10, "height": 10, "url": ""}
        ]))
        .unwrap();
        assert_eq!(project.config, SlicerConfig::default());
        assert_eq!(project.selections.len(), 1);
    }

    #[test]
    fn partial_defaults_fill_in_the_rest() {
        let project = parse_project(json!({
            "defaults": {"jpeg_quality": 70, "precedence": "last_created"},
            "selections": []
        }))
        .unwrap();
        assert_eq!(project.config.jpeg_quality, 70);
        assert_eq!(project.config.precedence, OccupantPrecedence::LastCreated);
        assert_eq!(project.config.display_width, DEFAULT_DISPLAY_WIDTH);
    }

    #[test]
    fn missing_selections_key_is_an_error() {
        let err = parse_project(json!({"defaults": {}})).unwrap_err();
        assert!(err.to_string().contains("'selections'"));
    }

    #[test]
    fn bad_quality_is_rejected() {
        let err = parse_project(json!({"defaults": {"jpeg_quality": 0}, "selections": []}))
            .unwrap_err();
        assert!(format!("{err:#}").contains("jpeg quality"));
    }

    #[test]
    fn bad_record_names_its_position() {
        let err = parse_project(json!([
            {"kind": "link", "x": 0, "y": 0, "width": 10, "height": 10},
            {"kind": "circle", "x": 0, "y": 0, "width": 10, "height": 10}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn project_round_trips_through_json() {
        let project = Project {
            config: SlicerConfig::default(),
            selections: vec![SelectionRecord {
                rect: crate::geometry::Rect::new(1, 2, 3, 4),
                content: SelectionContent::Link {
                    url: "http://x".into(),
                },
            }],
        };
        let back = parse_project(project.to_json().unwrap()).unwrap();
        assert_eq!(back.selections, project.selections);
    }

    #[test]
    fn explicit_out_dir_wins() {
        assert_eq!(
            out_root(Some(PathBuf::from("/tmp/x"))),
            PathBuf::from("/tmp/x")
        );
    }
}
