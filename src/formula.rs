// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

pub mod cache;
pub mod image;
pub mod mathjax;
pub mod pipeline;
pub mod size;
pub mod tasks;

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use pipeline::PipelineError;

pub const DEFAULT_SCALE: f64 = 1.25;
pub const DEFAULT_COLOR: [f64; 3] = [0.0, 0.0, 0.0];

#[derive(Debug, thiserror::Error)]
pub enum FormulaError {
    #[error("Formula type '{kind}' is not supported by {backend}!")]
    Unsupported { kind: String, backend: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Cannot determine image size: {0}")]
    ImageSize(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What kind of formula a body is, and how it is wrapped for TeX.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormulaType {
    Inline,
    Display,
    Align,
    TikzPicture(Option<String>),
    /// Keys `left`, `right`, `top`, `bottom` and `unit`.
    PsTricks(BTreeMap<String, String>),
}

impl FormulaType {
    pub fn name(&self) -> &'static str {
        match self {
            FormulaType::Inline => "inline",
            FormulaType::Display => "display",
            FormulaType::Align => "align",
            FormulaType::TikzPicture(_) => "tikzpicture",
            FormulaType::PsTricks(_) => "pstricks",
        }
    }
}

impl fmt::Display for FormulaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for FormulaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FormulaType::TikzPicture(args) => (self.name(), args).serialize(serializer),
            FormulaType::PsTricks(args) => (self.name(), args).serialize(serializer),
            _ => serializer.serialize_str(self.name()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFormulaType {
    Plain(String),
    WithArgs(String, serde_json::Value),
}

impl<'de> Deserialize<'de> for FormulaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawFormulaType::deserialize(deserializer)? {
            RawFormulaType::Plain(name) => match name.as_str() {
                "inline" => Ok(FormulaType::Inline),
                "display" => Ok(FormulaType::Display),
                "align" => Ok(FormulaType::Align),
                other => Err(de::Error::custom(format!("unknown formula type '{}'", other))),
            },
            RawFormulaType::WithArgs(name, args) => match (name.as_str(), args) {
                ("tikzpicture", serde_json::Value::Null) => Ok(FormulaType::TikzPicture(None)),
                ("tikzpicture", serde_json::Value::String(args)) => Ok(FormulaType::TikzPicture(Some(args))),
                ("pstricks", serde_json::Value::Object(args)) => {
                    let args = args
                        .into_iter()
                        .map(|(key, value)| match value {
                            serde_json::Value::String(value) => (key, value),
                            value => (key, value.to_string()),
                        })
                        .collect();
                    Ok(FormulaType::PsTricks(args))
                }
                (other, _) => Err(de::Error::custom(format!("invalid formula type '{}'", other))),
            },
        }
    }
}

/// Render parameters, cloned from the backend's template for every document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormulaContext {
    pub scale: f64,
    pub color: [f64; 3],
}

impl Default for FormulaContext {
    fn default() -> Self {
        FormulaContext {
            scale: DEFAULT_SCALE,
            color: DEFAULT_COLOR,
        }
    }
}

/// One formula used by a document, as stored in `.ltxfor` / `.texfor`
/// sidecars: `[body, [r, g, b], scale, type]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    into = "(String, [f64; 3], f64, FormulaType)",
    from = "(String, [f64; 3], f64, FormulaType)"
)]
pub struct FormulaRecord {
    pub body: String,
    pub color: [f64; 3],
    pub scale: f64,
    pub kind: FormulaType,
}

impl From<(String, [f64; 3], f64, FormulaType)> for FormulaRecord {
    fn from((body, color, scale, kind): (String, [f64; 3], f64, FormulaType)) -> Self {
        FormulaRecord {
            body,
            color,
            scale,
            kind,
        }
    }
}

impl From<FormulaRecord> for (String, [f64; 3], f64, FormulaType) {
    fn from(record: FormulaRecord) -> Self {
        (record.body, record.color, record.scale, record.kind)
    }
}

impl Ord for FormulaRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.body
            .cmp(&other.body)
            .then_with(|| {
                self.color
                    .iter()
                    .zip(other.color.iter())
                    .map(|(a, b)| a.total_cmp(b))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| self.scale.total_cmp(&other.scale))
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for FormulaRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FormulaRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FormulaRecord {}

/// Maps a color component in `[0, 1]` to `0..=255`.
pub fn quantize_color_component(value: f64) -> u8 {
    (value * 255.0).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_type_json() {
        assert_eq!(serde_json::to_string(&FormulaType::Inline).unwrap(), r#""inline""#);
        assert_eq!(
            serde_json::to_string(&FormulaType::TikzPicture(None)).unwrap(),
            r#"["tikzpicture",null]"#
        );
        let pst: FormulaType = serde_json::from_str(r#"["pstricks", {"left": 0, "unit": "1cm"}]"#).unwrap();
        let expected = BTreeMap::from([("left".to_string(), "0".to_string()), ("unit".to_string(), "1cm".to_string())]);
        assert_eq!(pst, FormulaType::PsTricks(expected));
        assert!(serde_json::from_str::<FormulaType>(r#""matrix""#).is_err());
    }

    #[test]
    fn test_record_json() {
        let record = FormulaRecord {
            body: "x^2".into(),
            color: [0.0, 0.5, 1.0],
            scale: 1.25,
            kind: FormulaType::TikzPicture(Some("scale=2".into())),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"["x^2",[0.0,0.5,1.0],1.25,["tikzpicture","scale=2"]]"#);
        let back: FormulaRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_order() {
        let record = |body: &str, scale: f64| FormulaRecord {
            body: body.into(),
            color: DEFAULT_COLOR,
            scale,
            kind: FormulaType::Inline,
        };
        let mut records = vec![record("b", 1.0), record("a", 2.0), record("a", 1.0), record("b", 1.0)];
        records.sort();
        records.dedup();
        assert_eq!(records, vec![record("a", 1.0), record("a", 2.0), record("b", 1.0)]);
    }

    #[test]
    fn test_quantize_color_component() {
        assert_eq!(quantize_color_component(0.0), 0);
        assert_eq!(quantize_color_component(0.5), 127);
        assert_eq!(quantize_color_component(1.0), 255);
        assert_eq!(quantize_color_component(1.7), 255);
        assert_eq!(quantize_color_component(-1.0), 0);
    }
}
