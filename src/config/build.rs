// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use serde::{Deserialize, Serialize};

pub const DEFAULT_SOURCE_DIR: &str = "posts";
pub const DEFAULT_OUTPUT_DIR: &str = "./output";
pub const DEFAULT_CACHE_DIR: &str = "./cache";
pub const DEFAULT_LANG: &str = "en";

#[derive(Deserialize, Debug, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Build {
    /// Directory scanned for `*.tex` sources.
    pub source: String,
    pub output: String,
    pub cache: String,
    pub translations: Vec<String>,
    pub default_lang: String,
    /// Sources start with a `.. key: value` metadata header.
    pub one_file: bool,
    pub beautify: bool,
}

impl Default for Build {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE_DIR.to_string(),
            output: DEFAULT_OUTPUT_DIR.to_string(),
            cache: DEFAULT_CACHE_DIR.to_string(),
            translations: vec![DEFAULT_LANG.to_string()],
            default_lang: DEFAULT_LANG.to_string(),
            one_file: false,
            beautify: true,
        }
    }
}
