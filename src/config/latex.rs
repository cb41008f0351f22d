// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{formula::image::IMAGE_RENDERER, latex::highlight::HighlighterKind};

#[derive(Deserialize, Debug, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Latex {
    /// Name of the formula renderer plugin.
    pub formula_renderer: String,
    pub highlighter: HighlighterKind,
    /// `lang -> theorem type -> title`.
    pub theorem_names: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for Latex {
    fn default() -> Self {
        Self {
            formula_renderer: IMAGE_RENDERER.to_string(),
            highlighter: HighlighterKind::default(),
            theorem_names: BTreeMap::new(),
        }
    }
}
