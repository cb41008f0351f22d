// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

pub mod deps;
pub mod plugin;
pub mod post;
pub mod theorems;

use std::{collections::BTreeMap, sync::Arc};

use camino::{Utf8Path, Utf8PathBuf};
use deps::DependencySidecar;
use eyre::{bail, eyre, WrapErr};
use plugin::{Dependency, DependencyKind, DependencyLevel, FormulaRenderer, LatexPlugin, PluginType};
use post::{dependency_file, with_added_extension, DeferredDependencies, ExtraDependencies, Post};

use crate::{
    context::{AddTo, LatexContext, LinkProvider, UptodateDependency},
    latex::{
        highlight::{Highlighter, HighlighterKind},
        htmlify::htmlify,
        parser::parse,
        parsing_env::ParsingEnvironment,
    },
};

pub struct CompilerOptions {
    pub formula_renderer: String,
    pub highlighter: HighlighterKind,
    pub beautify: bool,
    pub default_lang: String,
    pub translations: Vec<String>,
    /// Per-language overrides of theorem titles.
    pub theorem_names: BTreeMap<String, BTreeMap<String, String>>,
}

/// The initialized plugins and the options, shared with the posts so that
/// their extra dependencies are computed when asked for.
struct PluginHost {
    /// The active formula renderer comes first.
    plugins: Vec<Box<dyn LatexPlugin>>,
    options: CompilerOptions,
}

impl PluginHost {
    fn theorem_names(&self, lang: &str) -> BTreeMap<String, String> {
        theorems::theorem_names(lang, self.options.theorem_names.get(lang))
    }
}

impl ExtraDependencies for PluginHost {
    fn extra_deps(&self, post: &dyn Post, lang: &str, kind: DependencyKind, level: DependencyLevel) -> Vec<Dependency> {
        let mut result = Vec::new();
        if kind == DependencyKind::Uptodate && level == DependencyLevel::Fragment {
            let config = serde_json::json!({
                "formula_renderer": self.options.formula_renderer,
                "theorem_names": self.theorem_names(lang),
            });
            result.push(Dependency::Uptodate(UptodateDependency::new("latex_page_compiler:config", config)));
        }
        for plugin in &self.plugins {
            result.extend(plugin.add_extra_deps(post, lang, kind, level));
        }
        result
    }
}

/// Compiles LaTeX documents to HTML fragments and hosts the plugins.
pub struct Compiler {
    host: Arc<PluginHost>,
    highlighter: Box<dyn Highlighter>,
    parsing_env: ParsingEnvironment,
    link_providers: BTreeMap<Utf8PathBuf, Vec<Arc<dyn LinkProvider>>>,
    default_link_providers: Vec<Arc<dyn LinkProvider>>,
}

impl Compiler {
    /// Selects the formula renderer named in `options` among `plugins` and
    /// initializes it together with every non-renderer plugin.
    pub fn new(plugins: Vec<Box<dyn LatexPlugin>>, options: CompilerOptions) -> eyre::Result<Self> {
        let mut renderer = None;
        let mut others = Vec::new();
        for plugin in plugins {
            match plugin.plugin_type() {
                PluginType::FormulaRenderer if plugin.as_formula_renderer().is_some() => {
                    tracing::debug!("Found LaTeX formula renderer plugin {}", plugin.name());
                    if plugin.name() == options.formula_renderer {
                        renderer = Some(plugin);
                    }
                }
                PluginType::FormulaRenderer => {
                    color_print::ceprintln!("<y>Warning: Found broken LaTeX formula renderer plugin {}!</>", plugin.name());
                }
                PluginType::Other => {
                    tracing::debug!("Found LaTeX page compiler plugin {}", plugin.name());
                    others.push(plugin);
                }
            }
        }
        let Some(renderer) = renderer else {
            bail!("unknown formula renderer `{}`", options.formula_renderer);
        };

        let mut plugins = vec![renderer];
        plugins.extend(others);
        let mut parsing_env = ParsingEnvironment::default();
        for plugin in &mut plugins {
            let name = plugin.name().to_string();
            plugin
                .initialize(&mut parsing_env)
                .wrap_err_with(|| eyre!("failed to initialize plugin `{}`", name))?;
        }

        Ok(Compiler {
            highlighter: options.highlighter.create(),
            host: Arc::new(PluginHost { plugins, options }),
            parsing_env,
            link_providers: BTreeMap::new(),
            default_link_providers: Vec::new(),
        })
    }

    fn renderer(&self) -> eyre::Result<&dyn FormulaRenderer> {
        self.host
            .plugins
            .first()
            .and_then(|plugin| plugin.as_formula_renderer())
            .ok_or_else(|| eyre!("no formula renderer is active"))
    }

    pub fn renderer_name(&self) -> &str {
        &self.host.options.formula_renderer
    }

    pub fn get_parsing_environment(&self) -> &ParsingEnvironment {
        &self.parsing_env
    }

    pub fn theorem_names(&self, lang: &str) -> BTreeMap<String, String> {
        self.host.theorem_names(lang)
    }

    /// Registers a link provider for documents compiled from `source`.
    pub fn add_link_provider(&mut self, source: &Utf8Path, provider: Arc<dyn LinkProvider>) {
        self.link_providers.entry(source.to_owned()).or_default().push(provider);
    }

    /// Registers a link provider consulted for every document, after the
    /// source-specific ones.
    pub fn add_default_link_provider(&mut self, provider: Arc<dyn LinkProvider>) {
        self.default_link_providers.push(provider);
    }

    pub fn get_extra_targets(&self, post: &dyn Post, lang: &str, dest: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut targets = vec![dependency_file(post, lang)];
        for plugin in &self.host.plugins {
            targets.extend(plugin.get_extra_targets(post, lang, dest));
        }
        targets
    }

    /// Lets `post` re-read the dependencies recorded by its last compilation
    /// for every translation and level, next to the current extra ones.
    pub fn register_extra_dependencies(&self, post: &mut dyn Post) {
        for lang in &self.host.options.translations {
            for level in DependencyLevel::ALL {
                for kind in [DependencyKind::File, DependencyKind::Uptodate] {
                    let deferred = DeferredDependencies {
                        sidecar: dependency_file(post, lang),
                        lang: lang.clone(),
                        kind,
                        level,
                        extra: self.host.clone(),
                    };
                    post.add_deferred_dependencies(deferred);
                }
            }
        }
    }

    /// Compiles `data` to HTML.
    ///
    /// One-file sources start with a metadata header which ends at the first
    /// blank line and is skipped.
    pub fn compile_string(
        &self,
        data: &str,
        source: Option<&Utf8Path>,
        one_file: bool,
        post: Option<&dyn Post>,
        lang: Option<&str>,
    ) -> eyre::Result<(String, LatexContext)> {
        let lang = lang.unwrap_or(&self.host.options.default_lang);
        let data = match one_file {
            true => strip_metadata(data),
            false => data,
        };

        let mut ctx = LatexContext::new(
            LatexContext::hash_source(data),
            lang,
            self.theorem_names(lang),
            source.map(Utf8Path::to_string),
        );
        let providers = source.and_then(|source| self.link_providers.get(source));
        for provider in providers.into_iter().flatten().chain(&self.default_link_providers) {
            ctx.add_link_provider(Arc::clone(provider));
        }

        for plugin in &self.host.plugins {
            plugin.before_processing(&mut ctx, source, post)?;
        }

        let tree = parse(data, &self.parsing_env, ctx.name.as_deref())?;
        let beautify = self.host.options.beautify;
        let mut html = htmlify(&tree, self.renderer()?, self.highlighter.as_ref(), &mut ctx, beautify, 0)
            .wrap_err_with(|| eyre!("failed to render `{}`", ctx.get_name()))?;

        for plugin in &self.host.plugins {
            plugin.after_processing(&mut ctx, source, post)?;
        }
        for plugin in &self.host.plugins {
            html = plugin.modify_html_output(html, &mut ctx)?;
        }
        Ok((html, ctx))
    }

    /// Compiles `source` into `dest` and writes the dependency sidecar. With a
    /// `post`, the collected dependencies are registered with it and the
    /// plugins write their extra targets. On failure `dest` is removed.
    pub fn compile(
        &self,
        source: &Utf8Path,
        dest: &Utf8Path,
        one_file: bool,
        post: Option<&mut dyn Post>,
        lang: Option<&str>,
    ) -> eyre::Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| eyre!("failed to create directory `{}`", parent))?;
        }
        let result = self.compile_to(source, dest, one_file, post, lang.unwrap_or(&self.host.options.default_lang));
        if result.is_err() {
            _ = std::fs::remove_file(dest);
        }
        result
    }

    fn compile_to(
        &self,
        source: &Utf8Path,
        dest: &Utf8Path,
        one_file: bool,
        mut post: Option<&mut dyn Post>,
        lang: &str,
    ) -> eyre::Result<()> {
        let data = std::fs::read_to_string(source).wrap_err_with(|| eyre!("failed to read `{}`", source))?;
        let (html, mut ctx) = self.compile_string(&data, Some(source), one_file, post.as_deref(), Some(lang))?;
        std::fs::write(dest, html).wrap_err_with(|| eyre!("failed to write `{}`", dest))?;

        ctx.add_file_dependency(source.as_str(), AddTo::Both);
        if let Some(post) = post.as_deref() {
            for level in DependencyLevel::ALL {
                for kind in [DependencyKind::File, DependencyKind::Uptodate] {
                    for dep in self.host.extra_deps(post, lang, kind, level) {
                        match dep {
                            Dependency::File(file) => ctx.add_file_dependency(&file, level.into()),
                            Dependency::Uptodate(uptodate) => ctx.add_uptodate_dependency(uptodate, level.into()),
                        }
                    }
                }
            }
        }

        let deps_path = match post.as_deref() {
            Some(post) => dependency_file(post, lang),
            None => with_added_extension(dest, deps::DEPENDENCY_EXTENSION),
        };
        DependencySidecar::from_context(&ctx).write(&deps_path)?;

        if let Some(post) = post.as_deref_mut() {
            for file in ctx.file_dependencies_fragment() {
                post.add_dependency(Dependency::File(file), DependencyLevel::Fragment, lang);
            }
            for file in ctx.file_dependencies_page() {
                post.add_dependency(Dependency::File(file), DependencyLevel::Page, lang);
            }
            for uptodate in ctx.uptodate_dependencies_fragment() {
                post.add_dependency(Dependency::Uptodate(uptodate.clone()), DependencyLevel::Fragment, lang);
            }
            for uptodate in ctx.uptodate_dependencies_page() {
                post.add_dependency(Dependency::Uptodate(uptodate.clone()), DependencyLevel::Page, lang);
            }
            for plugin in &self.host.plugins {
                plugin.write_extra_targets(post, lang, dest, &ctx)?;
            }
        }
        Ok(())
    }

    /// Writes a new source file. One-file sources get a `.. key: value`
    /// metadata header followed by a blank line.
    pub fn create_post(path: &Utf8Path, content: &str, one_file: bool, metadata: &[(String, String)]) -> eyre::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| eyre!("failed to create directory `{}`", parent))?;
        }
        let mut text = String::new();
        if one_file {
            for (key, value) in metadata {
                text.push_str(&format!(".. {}: {}\n", key, value));
            }
            text.push('\n');
        }
        text.push_str(content);
        if !text.ends_with('\n') {
            text.push('\n');
        }
        std::fs::write(path, text).wrap_err_with(|| eyre!("failed to write `{}`", path))
    }
}

/// The part of a one-file source after the metadata header.
fn strip_metadata(data: &str) -> &str {
    let lf = data.find("\n\n").map(|i| (i, 2));
    let crlf = data.find("\r\n\r\n").map(|i| (i, 4));
    match [lf, crlf].into_iter().flatten().min() {
        Some((index, length)) => &data[index + length..],
        None => data,
    }
}
