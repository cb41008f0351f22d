// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

pub mod build;
pub mod formula;
pub mod latex;
pub mod links;

use std::collections::BTreeMap;

use build::Build;
use camino::Utf8PathBuf;
use formula::Formula;
use latex::Latex;
use links::Site;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "./texpage.toml";

#[derive(Deserialize, Debug, Default, Serialize)]
pub struct Config {
    #[serde(default)]
    pub build: Build,

    #[serde(default)]
    pub latex: Latex,

    #[serde(default)]
    pub formula: Formula,

    /// External sites that `\ref{site::label}` can point to.
    #[serde(default)]
    pub links: BTreeMap<String, Site>,
}

/// Try to find toml file in the current directory or the parent directory.
pub fn find_config(mut toml_file: Utf8PathBuf) -> eyre::Result<Utf8PathBuf> {
    if !toml_file.exists() {
        let parent = match toml_file.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.canonicalize_utf8()?,
            _ => Utf8PathBuf::from(".").canonicalize_utf8()?,
        };
        let Some(parent) = parent.parent() else {
            return Err(eyre::eyre!("cannot find configuration file: {}", toml_file));
        };

        toml_file = parent.join(DEFAULT_CONFIG_PATH);
        if !toml_file.exists() {
            return Err(eyre::eyre!("cannot find configuration file: {}", toml_file));
        }
    }
    Ok(toml_file)
}

pub fn parse_config(config: &str) -> eyre::Result<Config> {
    let config: Config =
        toml::from_str(config).map_err(|e| eyre::eyre!("failed to parse config file: {}", e))?;
    Ok(config)
}
