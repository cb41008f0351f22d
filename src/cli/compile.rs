// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use camino::Utf8PathBuf;
use eyre::{eyre, WrapErr};

use crate::{cli::create_compiler, compiler::post::PagePost, config, environment};

#[derive(clap::Args)]
pub struct CompileCommand {
    /// The LaTeX source to compile.
    #[arg(required = true)]
    path: Utf8PathBuf,

    /// Where to write the HTML. Defaults to the page's place in the output
    /// directory, or the source path with `.html` for files outside the
    /// source directory.
    #[arg(short, long)]
    output: Option<Utf8PathBuf>,

    /// Language of the compiled page.
    #[arg(short, long)]
    lang: Option<String>,

    /// The source starts with a metadata header.
    #[arg(long)]
    one_file: bool,

    /// Path to the configuration file (e.g., "texpage.toml").
    #[arg(short, long, default_value_t = config::DEFAULT_CONFIG_PATH.into())]
    config: String,
}

pub fn compile(command: &CompileCommand) -> eyre::Result<()> {
    environment::init_environment(Utf8PathBuf::from(&command.config))?;
    let compiler = create_compiler()?;
    let build = &environment::config().build;

    let source = &command.path;
    let lang = command.lang.as_deref().unwrap_or(&build.default_lang);
    let one_file = command.one_file || build.one_file;

    let dest = match environment::relative_source_path(source) {
        Some(relative) => {
            let mut post = PagePost::new(
                &relative,
                &environment::cache_dir(),
                &environment::output_dir(),
                &build.default_lang,
            );
            let dest = command.output.clone().unwrap_or_else(|| post.destination(lang));
            compiler
                .compile(source, &dest, one_file, Some(&mut post), Some(lang))
                .wrap_err_with(|| eyre!("failed to compile `{}`", source))?;
            dest
        }
        None => {
            let dest = command.output.clone().unwrap_or_else(|| source.with_extension("html"));
            compiler
                .compile(source, &dest, one_file, None, Some(lang))
                .wrap_err_with(|| eyre!("failed to compile `{}`", source))?;
            dest
        }
    };
    println!("Compiled to HTML: {}", dest);
    Ok(())
}
