// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{eyre, WrapErr};

use super::{tasks::FormulaService, FormulaContext, FormulaRecord, FormulaType};
use crate::{
    compiler::{
        plugin::{Dependency, DependencyKind, DependencyLevel, FormulaRenderer, LatexPlugin, PluginType},
        post::{with_added_extension, Post},
    },
    context::{LatexContext, UptodateDependency},
    html_flake::{escape_html_attribute, html_formula_image},
    latex::RenderError,
};

pub const IMAGE_RENDERER: &str = "latex_formula_image_renderer";
pub const FORMULAE_EXTENSION: &str = "ltxfor";
/// Formula sidecar of sources compiled without a post.
pub const EXTRA_FORMULAE_FILE: &str = ".texfor";

const FORMULAE_KEY: &str = "formulae";
const COUNT_KEY: &str = "count";

/// Renders formulae as `<img>` tags pointing at images made by a
/// [`FormulaService`], and records which formulae each document uses.
pub struct ImageRenderer {
    service: Arc<FormulaService>,
    context: FormulaContext,
    extra_sources: Utf8PathBuf,
}

impl ImageRenderer {
    pub fn new(service: Arc<FormulaService>, context: FormulaContext, extra_sources: &Utf8Path) -> Self {
        ImageRenderer {
            service,
            context,
            extra_sources: extra_sources.to_owned(),
        }
    }

    pub fn formulae_file(post: &dyn Post, lang: &str) -> Utf8PathBuf {
        with_added_extension(&post.translated_base_path(lang), FORMULAE_EXTENSION)
    }

    /// The `.texfor` sidecar of `source`, inside the extra sources directory.
    pub fn extra_formulae_file(&self, source: &Utf8Path) -> Utf8PathBuf {
        let relative = source.as_str().trim_start_matches('/');
        self.extra_sources.join(relative).join(EXTRA_FORMULAE_FILE)
    }

    fn used_formulae(ctx: &LatexContext) -> eyre::Result<Vec<FormulaRecord>> {
        let mut formulae: Vec<FormulaRecord> = match ctx.get_plugin_data(IMAGE_RENDERER, FORMULAE_KEY) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => vec![],
        };
        formulae.sort();
        Ok(formulae)
    }

    fn write_formulae(ctx: &LatexContext, path: &Utf8Path) -> eyre::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| eyre!("failed to create directory `{}`", parent))?;
        }
        let formulae = serde_json::to_string(&Self::used_formulae(ctx)?)?;
        std::fs::write(path, formulae).wrap_err_with(|| eyre!("failed to write formulae to `{}`", path))
    }
}

impl LatexPlugin for ImageRenderer {
    fn name(&self) -> &str {
        IMAGE_RENDERER
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::FormulaRenderer
    }

    fn get_extra_targets(&self, post: &dyn Post, lang: &str, _dest: &Utf8Path) -> Vec<Utf8PathBuf> {
        vec![Self::formulae_file(post, lang)]
    }

    fn add_extra_deps(&self, _post: &dyn Post, _lang: &str, kind: DependencyKind, level: DependencyLevel) -> Vec<Dependency> {
        match (kind, level) {
            (DependencyKind::Uptodate, DependencyLevel::Fragment) => {
                let config = serde_json::json!({
                    "scale": self.context.scale,
                    "color": self.context.color,
                });
                let name = format!("{}:config", IMAGE_RENDERER);
                vec![Dependency::Uptodate(UptodateDependency::new(name, config))]
            }
            _ => vec![],
        }
    }

    fn before_processing(&self, ctx: &mut LatexContext, _: Option<&Utf8Path>, _: Option<&dyn Post>) -> eyre::Result<()> {
        ctx.store_plugin_data(IMAGE_RENDERER, FORMULAE_KEY, serde_json::json!([]));
        Ok(())
    }

    fn after_processing(
        &self,
        ctx: &mut LatexContext,
        source: Option<&Utf8Path>,
        post: Option<&dyn Post>,
    ) -> eyre::Result<()> {
        if let Some(count) = ctx.get_plugin_data(IMAGE_RENDERER, COUNT_KEY) {
            tracing::debug!("Rendered {} formula image(s) for {}", count, ctx.get_name());
        }
        match (source, post) {
            (Some(source), None) => Self::write_formulae(ctx, &self.extra_formulae_file(source)),
            _ => Ok(()),
        }
    }

    fn write_extra_targets(&self, post: &dyn Post, lang: &str, _dest: &Utf8Path, ctx: &LatexContext) -> eyre::Result<()> {
        Self::write_formulae(ctx, &Self::formulae_file(post, lang))
    }

    fn as_formula_renderer(&self) -> Option<&dyn FormulaRenderer> {
        Some(self)
    }
}

impl FormulaRenderer for ImageRenderer {
    fn create_context(&self) -> FormulaContext {
        self.context
    }

    fn render(
        &self,
        body: &str,
        formula_context: &FormulaContext,
        kind: &FormulaType,
        ctx: &mut LatexContext,
    ) -> Result<String, RenderError> {
        let FormulaContext { scale, color } = *formula_context;
        let compiled = self.service.compile(body, color, scale, kind)?;
        ctx.inc_plugin_counter(IMAGE_RENDERER, COUNT_KEY);

        let record = FormulaRecord {
            body: body.to_string(),
            color,
            scale,
            kind: kind.clone(),
        };
        let record = serde_json::json!(record);
        match ctx.plugin_data_mut(IMAGE_RENDERER, FORMULAE_KEY) {
            Some(serde_json::Value::Array(formulae)) => formulae.push(record),
            _ => ctx.store_plugin_data(IMAGE_RENDERER, FORMULAE_KEY, serde_json::json!([record])),
        }

        let alt = escape_html_attribute(body);
        Ok(html_formula_image(
            kind.name(),
            compiled.width,
            compiled.height,
            &compiled.src,
            alt.trim(),
        ))
    }
}
