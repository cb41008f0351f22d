// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use camino::{Utf8Path, Utf8PathBuf};

use crate::{compiler::Compiler, config, environment};

#[derive(clap::Args)]
pub struct NewCommand {
    /// Path of the new source, relative to the source directory.
    #[arg(required = true)]
    path: Utf8PathBuf,

    /// Title recorded in the metadata header.
    #[arg(short, long)]
    title: Option<String>,

    /// Write a metadata header.
    #[arg(long)]
    one_file: bool,

    /// Path to the configuration file (e.g., "texpage.toml").
    #[arg(short, long, default_value_t = config::DEFAULT_CONFIG_PATH.into())]
    config: String,
}

pub fn new_post(command: &NewCommand) -> eyre::Result<()> {
    environment::init_environment(Utf8PathBuf::from(&command.config))?;
    let one_file = command.one_file || environment::config().build.one_file;
    let path = source_path(&environment::source_dir(), &command.path);
    if path.exists() {
        return Err(eyre::eyre!("Already exists: {}", path));
    }

    let mut metadata = vec![];
    if let Some(title) = &command.title {
        if !one_file {
            color_print::ceprintln!("<y>Warning: The title is only recorded in one-file sources.</>");
        }
        metadata.push(("title".to_string(), title.clone()));
    }
    Compiler::create_post(&path, "", one_file, &metadata)?;
    println!("Created new post at: {}", path);
    Ok(())
}

/// `path` below `source_dir`, with a `.tex` extension.
fn source_path(source_dir: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    let path = source_dir.join(path);
    match path.extension() {
        Some("tex") => path,
        _ => path.with_extension("tex"),
    }
}
