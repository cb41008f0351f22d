// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use camino::Utf8PathBuf;
use eyre::{eyre, WrapErr};

use crate::{cli::create_compiler, config, environment, latex::parser::parse};

#[derive(clap::Args)]
pub struct TreeCommand {
    /// The LaTeX source to parse.
    #[arg(required = true)]
    path: Utf8PathBuf,

    /// Path to the configuration file (e.g., "texpage.toml").
    #[arg(short, long, default_value_t = config::DEFAULT_CONFIG_PATH.into())]
    config: String,
}

/// Prints the document tree of a source.
pub fn tree(command: &TreeCommand) -> eyre::Result<()> {
    environment::init_environment(Utf8PathBuf::from(&command.config))?;
    let compiler = create_compiler()?;

    let path = &command.path;
    let data = std::fs::read_to_string(path).wrap_err_with(|| eyre!("failed to read `{}`", path))?;
    let root = parse(&data, compiler.get_parsing_environment(), Some(path.as_str()))?;
    print!("{}", root.dump());
    Ok(())
}
