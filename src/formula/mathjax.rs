// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use super::{FormulaContext, FormulaError, FormulaType};
use crate::{
    compiler::{
        plugin::{Dependency, DependencyKind, DependencyLevel, FormulaRenderer, LatexPlugin, PluginType},
        post::Post,
    },
    context::{LatexContext, UptodateDependency},
    html_flake::escape_html,
    latex::RenderError,
};

pub const MATHJAX_RENDERER: &str = "latex_formula_mathjax";
pub const DEFAULT_SCRIPT_ORIGIN: &str = "//cdn.mathjax.org/mathjax/latest/MathJax.js";

const INLINE_DELIMITER: (&str, &str) = (r"\(", r"\)");
const DISPLAY_DELIMITER: (&str, &str) = ("$$", "$$");

/// Leaves formulae to MathJax in the browser. Only inline and display
/// formulae are supported.
pub struct MathJaxRenderer {
    script_origin: String,
}

impl MathJaxRenderer {
    pub fn new(script_origin: &str) -> Self {
        MathJaxRenderer {
            script_origin: script_origin.to_string(),
        }
    }
}

impl Default for MathJaxRenderer {
    fn default() -> Self {
        MathJaxRenderer::new(DEFAULT_SCRIPT_ORIGIN)
    }
}

impl LatexPlugin for MathJaxRenderer {
    fn name(&self) -> &str {
        MATHJAX_RENDERER
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::FormulaRenderer
    }

    fn add_extra_deps(&self, _post: &dyn Post, _lang: &str, kind: DependencyKind, level: DependencyLevel) -> Vec<Dependency> {
        if (kind, level) != (DependencyKind::Uptodate, DependencyLevel::Fragment) {
            return vec![];
        }
        let delimiter = |(open, close): (&str, &str)| format!("{}{{0}}{}", open, close);
        let config = serde_json::json!({
            "script_origin": self.script_origin,
            "delimiters": {
                "inline": delimiter(INLINE_DELIMITER),
                "display": delimiter(DISPLAY_DELIMITER),
            },
        });
        let name = format!("{}:config", MATHJAX_RENDERER);
        vec![Dependency::Uptodate(UptodateDependency::new(name, config))]
    }

    fn modify_html_output(&self, html: String, _ctx: &mut LatexContext) -> eyre::Result<String> {
        Ok(format!(
            r#"<script type="text/x-mathjax-config">MathJax.Hub.Config({{tex2jax: {{inlineMath: [['\\(','\\)']]}}}});</script><script type="application/javascript" src="{}?config=TeX-AMS_HTML-full"></script>{}"#,
            self.script_origin, html
        ))
    }

    fn as_formula_renderer(&self) -> Option<&dyn FormulaRenderer> {
        Some(self)
    }
}

impl FormulaRenderer for MathJaxRenderer {
    fn create_context(&self) -> FormulaContext {
        FormulaContext::default()
    }

    fn render(&self, body: &str, _: &FormulaContext, kind: &FormulaType, _: &mut LatexContext) -> Result<String, RenderError> {
        let (open, close) = match kind {
            FormulaType::Inline => INLINE_DELIMITER,
            FormulaType::Display => DISPLAY_DELIMITER,
            kind => {
                return Err(FormulaError::Unsupported {
                    kind: kind.name().to_string(),
                    backend: "MathJax formula rendering backend".to_string(),
                }
                .into())
            }
        };
        Ok(format!("{}{}{}", open, escape_html(body), close))
    }
}
