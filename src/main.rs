// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

mod cli;
mod compiler;
mod config;
mod context;
mod environment;
mod formula;
mod html_flake;
mod latex;
mod path_utils;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{
    build::BuildCommand, compile::CompileCommand, formulae::FormulaeCommand, new::NewCommand,
    tree::TreeCommand,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Compile every source to HTML and render the formula images.
    #[command(visible_alias = "b")]
    Build(BuildCommand),

    /// Compile a single LaTeX file to HTML.
    #[command(visible_alias = "c")]
    Compile(CompileCommand),

    /// Render the formula images recorded by earlier compilations.
    #[command(visible_alias = "f")]
    Formulae(FormulaeCommand),

    /// Print the document tree of a LaTeX file.
    #[command(visible_alias = "t")]
    Tree(TreeCommand),

    /// Create a new source file.
    #[command(visible_alias = "n")]
    New(NewCommand),
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "texpage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Build(command) => crate::cli::build::build(command)?,
        Command::Compile(command) => crate::cli::compile::compile(command)?,
        Command::Formulae(command) => crate::cli::formulae::formulae(command)?,
        Command::Tree(command) => crate::cli::tree::tree(command)?,
        Command::New(command) => crate::cli::new::new_post(command)?,
    };
    Ok(())
}
