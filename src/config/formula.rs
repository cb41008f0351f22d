// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::formula::{
    mathjax::DEFAULT_SCRIPT_ORIGIN,
    pipeline::{Engine, OutputFormat},
    DEFAULT_COLOR, DEFAULT_SCALE,
};

pub const DEFAULT_FORMULA_FOLDER: &str = "formulae";

/// Extra preamble for formula documents: one string used everywhere, or
/// fragments keyed by `""`, program name, `tikz`, `pstricks` or `xy`.
#[derive(Deserialize, Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Preamble {
    Text(String),
    Table(BTreeMap<String, String>),
}

impl Default for Preamble {
    fn default() -> Self {
        Preamble::Table(BTreeMap::new())
    }
}

impl Preamble {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Preamble::Text(text) if text.is_empty() => BTreeMap::new(),
            Preamble::Text(text) => BTreeMap::from([(String::new(), text.clone())]),
            Preamble::Table(table) => table.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Formula {
    pub scale: f64,
    pub color: [f64; 3],
    pub output_format: OutputFormat,
    pub engine: Engine,
    /// Output sub folder and URL prefix of the images.
    pub folder: String,
    pub as_data_uri: bool,
    pub optimize_png: bool,
    pub additional_preamble: Preamble,
    pub mathjax_origin: String,
}

impl Default for Formula {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            color: DEFAULT_COLOR,
            output_format: OutputFormat::default(),
            engine: Engine::default(),
            folder: DEFAULT_FORMULA_FOLDER.to_string(),
            as_data_uri: false,
            optimize_png: false,
            additional_preamble: Preamble::default(),
            mathjax_origin: DEFAULT_SCRIPT_ORIGIN.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_table() {
        let formula: Formula = toml::from_str(
            r#"
            [additional-preamble]
            "" = "\\usepackage{bm}"
            tikz = "\\usetikzlibrary{arrows}"
            "#,
        )
        .unwrap();
        let map = formula.additional_preamble.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["tikz"], "\\usetikzlibrary{arrows}");
        assert!(Preamble::Text(String::new()).to_map().is_empty());
    }
}
