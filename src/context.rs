// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{compiler::plugin::DependencyLevel, latex::RenderError};

/// Dependency level a dependency is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddTo {
    Fragment,
    Page,
    Both,
}

impl AddTo {
    fn fragment(self) -> bool {
        matches!(self, AddTo::Fragment | AddTo::Both)
    }

    fn page(self) -> bool {
        matches!(self, AddTo::Page | AddTo::Both)
    }
}

impl From<DependencyLevel> for AddTo {
    fn from(level: DependencyLevel) -> Self {
        match level {
            DependencyLevel::Fragment => AddTo::Fragment,
            DependencyLevel::Page => AddTo::Page,
        }
    }
}

/// A structured staleness predicate: the step is stale when `deps` changed
/// since the last run recorded under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptodateDependency {
    pub name: String,
    pub deps: serde_json::Value,
}

impl UptodateDependency {
    pub fn new(name: impl Into<String>, deps: serde_json::Value) -> Self {
        UptodateDependency {
            name: name.into(),
            deps,
        }
    }
}

/// Resolves `site::label` references to `(url, text)`.
pub trait LinkProvider: Send + Sync {
    fn provide_link(&self, site: &str, label: &str, lang: &str) -> Option<(String, String)>;
}

/// A label entry of a [`StaticLinkProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    pub url: String,
    pub text: String,
}

/// Answers references of one site from a fixed label table.
#[derive(Debug, Clone)]
pub struct StaticLinkProvider {
    site: String,
    base_url: Option<url::Url>,
    labels: BTreeMap<String, LinkTarget>,
}

impl StaticLinkProvider {
    pub fn new(site: impl Into<String>, base_url: Option<url::Url>, labels: BTreeMap<String, LinkTarget>) -> Self {
        StaticLinkProvider {
            site: site.into(),
            base_url,
            labels,
        }
    }
}

impl LinkProvider for StaticLinkProvider {
    fn provide_link(&self, site: &str, label: &str, _lang: &str) -> Option<(String, String)> {
        if site != self.site {
            return None;
        }
        let target = self.labels.get(label)?;
        let url = match &self.base_url {
            Some(base) => base.join(&target.url).map(String::from).unwrap_or_else(|_| target.url.clone()),
            None => target.url.clone(),
        };
        Some((url, target.text.clone()))
    }
}

/// Per-document state threaded through parsing, rendering and the plugins.
pub struct LatexContext {
    pub id: u64,
    pub name: Option<String>,
    pub lang: String,
    /// Theorem environment kind to translated title.
    pub theorem_names: BTreeMap<String, String>,
    file_deps_fragment: BTreeSet<String>,
    file_deps_page: BTreeSet<String>,
    uptodate_deps_fragment: Vec<UptodateDependency>,
    uptodate_deps_page: Vec<UptodateDependency>,
    plugin_data: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    link_providers: Vec<Arc<dyn LinkProvider>>,
}

impl LatexContext {
    pub fn new(id: u64, lang: &str, theorem_names: BTreeMap<String, String>, name: Option<String>) -> Self {
        LatexContext {
            id,
            name,
            lang: lang.to_string(),
            theorem_names,
            file_deps_fragment: BTreeSet::new(),
            file_deps_page: BTreeSet::new(),
            uptodate_deps_fragment: Vec::new(),
            uptodate_deps_page: Vec::new(),
            plugin_data: BTreeMap::new(),
            link_providers: Vec::new(),
        }
    }

    /// Identity of a document: the hash of its source text.
    pub fn hash_source(source: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        hasher.finish()
    }

    pub fn get_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("(unknown:{})", self.id))
    }

    pub fn add_file_dependency(&mut self, filename: &str, add: AddTo) {
        if add.fragment() {
            self.file_deps_fragment.insert(filename.to_string());
        }
        if add.page() {
            self.file_deps_page.insert(filename.to_string());
        }
    }

    pub fn add_uptodate_dependency(&mut self, dependency: UptodateDependency, add: AddTo) {
        if add.fragment() {
            self.uptodate_deps_fragment.push(dependency.clone());
        }
        if add.page() {
            self.uptodate_deps_page.push(dependency);
        }
    }

    pub fn add_link_provider(&mut self, provider: Arc<dyn LinkProvider>) {
        self.link_providers.push(provider);
    }

    pub fn file_dependencies_fragment(&self) -> Vec<String> {
        self.file_deps_fragment.iter().cloned().collect()
    }

    pub fn file_dependencies_page(&self) -> Vec<String> {
        self.file_deps_page.iter().cloned().collect()
    }

    pub fn uptodate_dependencies_fragment(&self) -> &[UptodateDependency] {
        &self.uptodate_deps_fragment
    }

    pub fn uptodate_dependencies_page(&self) -> &[UptodateDependency] {
        &self.uptodate_deps_page
    }

    pub fn store_plugin_data(&mut self, plugin: &str, key: &str, data: serde_json::Value) {
        self.plugin_data
            .entry(plugin.to_string())
            .or_default()
            .insert(key.to_string(), data);
    }

    pub fn get_plugin_data(&self, plugin: &str, key: &str) -> Option<&serde_json::Value> {
        self.plugin_data.get(plugin)?.get(key)
    }

    pub fn plugin_data_mut(&mut self, plugin: &str, key: &str) -> Option<&mut serde_json::Value> {
        self.plugin_data.get_mut(plugin)?.get_mut(key)
    }

    /// Increments and returns a per-plugin counter, starting at 1.
    pub fn inc_plugin_counter(&mut self, plugin: &str, key: &str) -> u64 {
        let counter = self
            .get_plugin_data(plugin, key)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
            + 1;
        self.store_plugin_data(plugin, key, counter.into());
        counter
    }

    /// Resolves a reference target to `(url, text)`.
    ///
    /// `site::label` must be answered by one of the link providers. A target
    /// with a single colon is offered to the providers split at that colon and
    /// falls back to a local anchor, as does a target without any colon.
    pub fn provide_link(&self, reference: &str) -> Result<(String, String), RenderError> {
        if let Some((site, label)) = reference.split_once("::") {
            return self
                .query_providers(site, label)
                .ok_or_else(|| RenderError::UnresolvedLink {
                    site: site.to_string(),
                    label: label.to_string(),
                });
        }
        if let Some((site, label)) = reference.split_once(':') {
            if let Some(link) = self.query_providers(site, label) {
                return Ok(link);
            }
        }
        Ok((format!("#{}", reference), reference.to_string()))
    }

    fn query_providers(&self, site: &str, label: &str) -> Option<(String, String)> {
        self.link_providers
            .iter()
            .find_map(|provider| provider.provide_link(site, label, &self.lang))
    }
}

impl fmt::Display for LatexContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LatexContext<{}>({:?}, {:?}, {} fragment uptodate, {} page uptodate)",
            self.id,
            self.file_deps_fragment,
            self.file_deps_page,
            self.uptodate_deps_fragment.len(),
            self.uptodate_deps_page.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> LatexContext {
        LatexContext::new(LatexContext::hash_source("x"), "en", BTreeMap::new(), None)
    }

    fn theorems() -> Arc<dyn LinkProvider> {
        let labels = BTreeMap::from([(
            "main".to_string(),
            LinkTarget {
                url: "/theorems/main".into(),
                text: "Theorem 1".into(),
            },
        )]);
        Arc::new(StaticLinkProvider::new("thm", None, labels))
    }

    #[test]
    fn test_dependencies() {
        let mut ctx = context();
        ctx.add_file_dependency("b.png", AddTo::Both);
        ctx.add_file_dependency("a.png", AddTo::Fragment);
        ctx.add_file_dependency("b.png", AddTo::Page);
        ctx.add_uptodate_dependency(UptodateDependency::new("cfg", serde_json::json!({"k": 1})), AddTo::Page);

        assert_eq!(ctx.file_dependencies_fragment(), vec!["a.png", "b.png"]);
        assert_eq!(ctx.file_dependencies_page(), vec!["b.png"]);
        assert!(ctx.uptodate_dependencies_fragment().is_empty());
        assert_eq!(ctx.uptodate_dependencies_page()[0].name, "cfg");
    }

    #[test]
    fn test_plugin_data() {
        let mut ctx = context();
        assert_eq!(ctx.get_plugin_data("p", "k"), None);
        assert_eq!(ctx.inc_plugin_counter("p", "n"), 1);
        assert_eq!(ctx.inc_plugin_counter("p", "n"), 2);
        ctx.store_plugin_data("p", "k", serde_json::json!([]));
        if let Some(serde_json::Value::Array(items)) = ctx.plugin_data_mut("p", "k") {
            items.push(1.into());
        }
        assert_eq!(ctx.get_plugin_data("p", "k"), Some(&serde_json::json!([1])));
        assert_eq!(ctx.get_name(), format!("(unknown:{})", ctx.id));
    }

    #[test]
    fn test_provide_link() {
        let mut ctx = context();
        ctx.add_link_provider(theorems());

        assert_eq!(ctx.provide_link("intro").unwrap(), ("#intro".to_string(), "intro".to_string()));
        assert_eq!(
            ctx.provide_link("thm::main").unwrap(),
            ("/theorems/main".to_string(), "Theorem 1".to_string())
        );
        assert_eq!(
            ctx.provide_link("thm:main").unwrap(),
            ("/theorems/main".to_string(), "Theorem 1".to_string())
        );
        assert_eq!(ctx.provide_link("eq:1").unwrap(), ("#eq:1".to_string(), "eq:1".to_string()));
        assert!(matches!(
            ctx.provide_link("thm::other"),
            Err(RenderError::UnresolvedLink { .. })
        ));
    }

    #[test]
    fn test_static_provider_base_url() {
        let labels = BTreeMap::from([(
            "x".to_string(),
            LinkTarget {
                url: "notes/x.html#x".into(),
                text: "X".into(),
            },
        )]);
        let base = url::Url::parse("https://example.org/blog/").unwrap();
        let provider = StaticLinkProvider::new("blog", Some(base), labels);
        assert_eq!(
            provider.provide_link("blog", "x", "en"),
            Some(("https://example.org/blog/notes/x.html#x".to_string(), "X".to_string()))
        );
        assert_eq!(provider.provide_link("other", "x", "en"), None);
    }
}
