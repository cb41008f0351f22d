// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use camino::Utf8PathBuf;

use crate::{
    cli::{find_files, run_formula_tasks},
    compiler::post::POST_CACHE_DIR_NAME,
    config, environment,
    formula::image::FORMULAE_EXTENSION,
};

#[derive(clap::Args)]
pub struct FormulaeCommand {
    /// Path to the configuration file (e.g., "texpage.toml").
    #[arg(short, long, default_value_t = config::DEFAULT_CONFIG_PATH.into())]
    config: String,
}

/// Renders the formula images recorded by earlier compilations.
pub fn formulae(command: &FormulaeCommand) -> eyre::Result<()> {
    environment::init_environment(Utf8PathBuf::from(&command.config))?;
    if environment::config().formula.as_data_uri {
        color_print::ceprintln!("<y>Warning: Formulae are embedded as data URIs, no images to render.</>");
        return Ok(());
    }
    let sidecars = find_files(&environment::cache_dir().join(POST_CACHE_DIR_NAME), FORMULAE_EXTENSION);
    let written = run_formula_tasks(sidecars)?;
    println!("Rendered {} formula images to: {}", written, environment::formula_output_dir());
    Ok(())
}
