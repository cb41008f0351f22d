// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use camino::{Utf8Path, Utf8PathBuf};

use super::post::Post;
use crate::{
    context::{LatexContext, UptodateDependency},
    formula::{FormulaContext, FormulaType},
    latex::{parsing_env::ParsingEnvironment, RenderError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    /// Exactly one formula renderer is active, selected by name.
    FormulaRenderer,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
    File,
    Uptodate,
}

/// Whether a dependency invalidates the HTML fragment or the whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyLevel {
    Fragment,
    Page,
}

impl DependencyLevel {
    pub const ALL: [DependencyLevel; 2] = [DependencyLevel::Fragment, DependencyLevel::Page];
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    File(String),
    Uptodate(UptodateDependency),
}

/// An extension of the page compiler. Every hook has a no-op default.
pub trait LatexPlugin {
    fn name(&self) -> &str;

    fn plugin_type(&self) -> PluginType {
        PluginType::Other
    }

    /// Called once when the compiler is created, e.g. to register commands.
    fn initialize(&mut self, _env: &mut ParsingEnvironment) -> eyre::Result<()> {
        Ok(())
    }

    /// Files this plugin writes next to a compiled post.
    fn get_extra_targets(&self, _post: &dyn Post, _lang: &str, _dest: &Utf8Path) -> Vec<Utf8PathBuf> {
        vec![]
    }

    fn add_extra_deps(
        &self,
        _post: &dyn Post,
        _lang: &str,
        _kind: DependencyKind,
        _level: DependencyLevel,
    ) -> Vec<Dependency> {
        vec![]
    }

    fn before_processing(
        &self,
        _ctx: &mut LatexContext,
        _source: Option<&Utf8Path>,
        _post: Option<&dyn Post>,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn after_processing(
        &self,
        _ctx: &mut LatexContext,
        _source: Option<&Utf8Path>,
        _post: Option<&dyn Post>,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn write_extra_targets(
        &self,
        _post: &dyn Post,
        _lang: &str,
        _dest: &Utf8Path,
        _ctx: &LatexContext,
    ) -> eyre::Result<()> {
        Ok(())
    }

    /// Last-chance transformation of the rendered document.
    fn modify_html_output(&self, html: String, _ctx: &mut LatexContext) -> eyre::Result<String> {
        Ok(html)
    }

    fn as_formula_renderer(&self) -> Option<&dyn FormulaRenderer> {
        None
    }
}

/// Turns formula bodies into HTML.
pub trait FormulaRenderer: LatexPlugin {
    /// The render parameters for one document.
    fn create_context(&self) -> FormulaContext;

    fn render(
        &self,
        body: &str,
        formula_context: &FormulaContext,
        kind: &FormulaType,
        ctx: &mut LatexContext,
    ) -> Result<String, RenderError>;
}
