// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{eyre, WrapErr};

use crate::{
    config::{self, Config},
    path_utils,
};

pub const FORMULA_CACHE_DIR_NAME: &str = "formulae";
pub const EXTRA_FORMULA_SOURCES_DIR_NAME: &str = "extra-formula-sources";

pub struct Environment {
    /// Specifies the project root path.
    ///
    /// Please note that this value should always be automatically derived from
    /// the location of the toml configuration file.
    pub root: Utf8PathBuf,
    pub config: Config,
}

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn get_environment() -> &'static Environment {
    ENVIRONMENT.get().expect("environment must be initialized")
}

pub fn init_environment(toml_file: Utf8PathBuf) -> eyre::Result<()> {
    let toml_file = config::find_config(toml_file)?;

    let (root, _file_name) =
        path_utils::split_file_name(&toml_file).ok_or_else(|| eyre!("path cannot be empty"))?;
    let toml = std::fs::read_to_string(&toml_file)
        .wrap_err_with(|| eyre!("failed to read configuration file `{}`", toml_file))?;

    _ = ENVIRONMENT.set(Environment {
        root: root.to_owned(),
        config: config::parse_config(&toml)?,
    });
    Ok(())
}

/// Mock environment for testing purposes.
#[allow(dead_code)]
pub fn mock_environment() -> eyre::Result<()> {
    _ = ENVIRONMENT.set(Environment {
        root: "./".into(),
        config: Config::default(),
    });
    Ok(())
}

pub fn config() -> &'static Config {
    &get_environment().config
}

pub fn root_dir() -> &'static Utf8Path {
    &get_environment().root
}

pub fn source_dir() -> Utf8PathBuf {
    root_dir().join(&config().build.source)
}

pub fn output_dir() -> Utf8PathBuf {
    root_dir().join(&config().build.output)
}

pub fn cache_dir() -> Utf8PathBuf {
    root_dir().join(&config().build.cache)
}

/// Rendered formula images and the naming database.
pub fn formula_cache_dir() -> Utf8PathBuf {
    cache_dir().join(FORMULA_CACHE_DIR_NAME)
}

pub fn formula_output_dir() -> Utf8PathBuf {
    output_dir().join(config().formula.folder.trim_matches('/'))
}

/// `.texfor` sidecars of sources compiled without a post.
pub fn extra_formula_sources_dir() -> Utf8PathBuf {
    cache_dir().join(EXTRA_FORMULA_SOURCES_DIR_NAME)
}

/// Path of `source` relative to the source directory, if it lies below it.
pub fn relative_source_path(source: &Utf8Path) -> Option<Utf8PathBuf> {
    let source_dir = source_dir();
    let source_dir = source_dir.canonicalize_utf8().unwrap_or(source_dir);
    let source = source.canonicalize_utf8().ok()?;
    source.strip_prefix(&source_dir).ok().map(Utf8Path::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_environment() {
        mock_environment().unwrap();
        assert_eq!(source_dir(), Utf8PathBuf::from("./posts"));
        assert_eq!(formula_cache_dir(), Utf8PathBuf::from("./cache/formulae"));
        assert_eq!(formula_output_dir(), Utf8PathBuf::from("./output/formulae"));
        assert_eq!(
            extra_formula_sources_dir(),
            Utf8PathBuf::from("./cache/extra-formula-sources")
        );
    }
}
