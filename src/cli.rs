// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

pub mod build;
pub mod compile;
pub mod formulae;
pub mod new;
pub mod tree;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{eyre, WrapErr};
use walkdir::WalkDir;

use crate::{
    compiler::{plugin::LatexPlugin, Compiler, CompilerOptions},
    environment,
    formula::{
        cache::FormulaCache,
        image::ImageRenderer,
        mathjax::MathJaxRenderer,
        pipeline::FormulaPipeline,
        tasks::{FormulaService, SidecarCollector, TaskState},
        FormulaContext,
    },
};

/// Files below `dir` with the given extension, in file name order.
pub fn find_files(dir: &Utf8Path, extension: &str) -> Vec<Utf8PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        .filter(|path| path.extension() == Some(extension))
        .collect()
}

pub fn formula_service() -> FormulaService {
    let formula = &environment::config().formula;
    let pipeline = FormulaPipeline {
        engine: formula.engine,
        output_format: formula.output_format,
        additional_preamble: formula.additional_preamble.to_map(),
        optimize_png: formula.optimize_png,
    };
    FormulaService::new(
        FormulaCache::new(&environment::formula_cache_dir()),
        pipeline,
        &environment::output_dir(),
        &formula.folder,
        formula.as_data_uri,
    )
}

/// The compiler with every known formula renderer and the configured link
/// providers. The `[latex] formula-renderer` setting picks the active one.
pub fn create_compiler() -> eyre::Result<Compiler> {
    let config = environment::config();
    let context = FormulaContext {
        scale: config.formula.scale,
        color: config.formula.color,
    };
    let plugins: Vec<Box<dyn LatexPlugin>> = vec![
        Box::new(ImageRenderer::new(
            Arc::new(formula_service()),
            context,
            &environment::extra_formula_sources_dir(),
        )),
        Box::new(MathJaxRenderer::new(&config.formula.mathjax_origin)),
    ];
    let options = CompilerOptions {
        formula_renderer: config.latex.formula_renderer.clone(),
        highlighter: config.latex.highlighter,
        beautify: config.build.beautify,
        default_lang: config.build.default_lang.clone(),
        translations: config.build.translations.clone(),
        theorem_names: config.latex.theorem_names.clone(),
    };

    let mut compiler = Compiler::new(plugins, options)?;
    let source_dir = environment::source_dir();
    for (name, site) in &config.links {
        let provider = Arc::new(site.provider(name)?);
        if site.sources.is_empty() {
            compiler.add_default_link_provider(provider);
            continue;
        }
        for source in &site.sources {
            compiler.add_link_provider(&source_dir.join(source), provider.clone());
        }
    }
    Ok(compiler)
}

/// Renders the formulae listed in `sidecars` and in the extra formula
/// sources whose images are missing or were made from other inputs. Returns
/// the number of images written.
pub fn run_formula_tasks(sidecars: Vec<Utf8PathBuf>) -> eyre::Result<usize> {
    let mut service = formula_service();
    service.add_collector(Box::new(SidecarCollector::new(
        sidecars,
        &environment::extra_formula_sources_dir(),
    )));

    let state_file = service.task_state_file();
    let mut state = TaskState::read(&state_file);
    let mut written = 0;
    for task in service.gen_tasks()? {
        if task.is_uptodate(&state) {
            tracing::debug!("Formula task {} is up to date", task.name());
            continue;
        }
        task.run(&service)
            .wrap_err_with(|| eyre!("failed to run task `{}`", task.name()))?;
        state.record(&task);
        written += 1;
    }
    state.write(&state_file)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("b/c.tex"), "").unwrap();
        std::fs::write(root.join("a.tex"), "").unwrap();
        std::fs::write(root.join("a.html"), "").unwrap();

        let files = find_files(root, "tex");
        assert_eq!(files, vec![root.join("a.tex"), root.join("b/c.tex")]);
        assert!(find_files(&root.join("missing"), "tex").is_empty());
    }
}
