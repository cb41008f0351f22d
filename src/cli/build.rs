// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use camino::Utf8PathBuf;
use eyre::{eyre, WrapErr};

use crate::{
    cli::{create_compiler, find_files, run_formula_tasks},
    compiler::post::PagePost,
    config, environment,
    formula::image::FORMULAE_EXTENSION,
    path_utils,
};

#[derive(clap::Args)]
pub struct BuildCommand {
    /// Path to the configuration file (e.g., "texpage.toml").
    #[arg(short, long, default_value_t = config::DEFAULT_CONFIG_PATH.into())]
    config: String,

    /// Recompile pages even when they are up to date.
    #[arg(short, long)]
    force: bool,
}

/// Compiles every source for every translation whose page is out of date,
/// then renders the formula images the pages need.
pub fn build(command: &BuildCommand) -> eyre::Result<()> {
    environment::init_environment(Utf8PathBuf::from(&command.config))?;
    let compiler = create_compiler()?;
    let build = &environment::config().build;

    let source_dir = environment::source_dir();
    let cache_dir = environment::cache_dir();
    let output_dir = environment::output_dir();
    let mut formula_sidecars = Vec::new();
    for source in find_files(&source_dir, "tex") {
        let relative = source
            .strip_prefix(&source_dir)
            .wrap_err_with(|| eyre!("`{}` is not below `{}`", source, source_dir))?;
        let mut post = PagePost::new(relative, &cache_dir, &output_dir, &build.default_lang);
        compiler.register_extra_dependencies(&mut post);

        for lang in &build.translations {
            let dest = post.destination(lang);
            let targets = compiler.get_extra_targets(&post, lang, &dest);
            formula_sidecars.extend(targets.into_iter().filter(|t| t.extension() == Some(FORMULAE_EXTENSION)));

            if !command.force && post.is_uptodate(lang)? {
                tracing::info!("Up to date: {}", path_utils::pretty_path(&dest));
                continue;
            }
            compiler
                .compile(&source, &dest, build.one_file, Some(&mut post), Some(lang))
                .wrap_err_with(|| eyre!("failed to compile `{}`", source))?;
            println!("Compiled to HTML: {}", path_utils::pretty_path(&dest));
        }
    }

    let written = run_formula_tasks(formula_sidecars)?;
    if written > 0 {
        println!("Rendered {} formula images to: {}", written, environment::formula_output_dir());
    }
    Ok(())
}
