// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

use camino::{Utf8Path, Utf8PathBuf};

use super::{
    deps::{DependencySidecar, DEPENDENCY_EXTENSION},
    plugin::{Dependency, DependencyKind, DependencyLevel},
};

/// The host's view of a document being built.
pub trait Post {
    /// Path stem, without extension, under which per-language sidecars live.
    fn translated_base_path(&self, lang: &str) -> Utf8PathBuf;

    fn add_dependency(&mut self, dependency: Dependency, level: DependencyLevel, lang: &str);

    /// Registers dependencies which are only resolved when asked for.
    fn add_deferred_dependencies(&mut self, deferred: DeferredDependencies);
}

/// Appends `.{extension}` to the full file name of `path`.
pub fn with_added_extension(path: &Utf8Path, extension: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.{}", path, extension))
}

pub fn dependency_file(post: &dyn Post, lang: &str) -> Utf8PathBuf {
    with_added_extension(&post.translated_base_path(lang), DEPENDENCY_EXTENSION)
}

/// Source of the dependencies a post has independently of its content, such
/// as the configuration of the compiler and its plugins.
pub trait ExtraDependencies {
    fn extra_deps(&self, post: &dyn Post, lang: &str, kind: DependencyKind, level: DependencyLevel) -> Vec<Dependency>;
}

/// Dependencies recorded by the previous build of a post, read back from its
/// `.ltxdep` sidecar on demand, together with the current extra dependencies.
#[derive(Clone)]
pub struct DeferredDependencies {
    pub sidecar: Utf8PathBuf,
    pub lang: String,
    pub kind: DependencyKind,
    pub level: DependencyLevel,
    pub extra: Arc<dyn ExtraDependencies>,
}

impl DeferredDependencies {
    pub fn recorded(&self) -> eyre::Result<Vec<Dependency>> {
        Ok(DependencySidecar::read(&self.sidecar)?.select(self.kind, self.level))
    }

    pub fn current(&self, post: &dyn Post) -> Vec<Dependency> {
        self.extra.extra_deps(post, &self.lang, self.kind, self.level)
    }

    pub fn resolve(&self, post: &dyn Post) -> eyre::Result<Vec<Dependency>> {
        let mut result = self.recorded()?;
        for dep in self.current(post) {
            if !result.contains(&dep) {
                result.push(dep);
            }
        }
        Ok(result)
    }
}

fn modified(path: &Utf8Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Cache sub folder holding the sidecars of [`PagePost`]s.
pub const POST_CACHE_DIR_NAME: &str = "posts";

/// A standalone page: `<source>/<relative>.tex` compiled to
/// `<output>/[<lang>/]<relative>.html`. Sidecars go to the cache directory.
pub struct PagePost {
    relative: Utf8PathBuf,
    cache_dir: Utf8PathBuf,
    output_dir: Utf8PathBuf,
    default_lang: String,
    dependencies: BTreeMap<(String, DependencyLevel), Vec<Dependency>>,
    deferred: Vec<DeferredDependencies>,
}

impl PagePost {
    pub fn new(relative: &Utf8Path, cache_dir: &Utf8Path, output_dir: &Utf8Path, default_lang: &str) -> Self {
        PagePost {
            relative: relative.with_extension(""),
            cache_dir: cache_dir.to_owned(),
            output_dir: output_dir.to_owned(),
            default_lang: default_lang.to_string(),
            dependencies: BTreeMap::new(),
            deferred: Vec::new(),
        }
    }

    fn lang_prefix(&self, lang: &str) -> Utf8PathBuf {
        match lang == self.default_lang {
            true => Utf8PathBuf::new(),
            false => Utf8PathBuf::from(lang),
        }
    }

    pub fn destination(&self, lang: &str) -> Utf8PathBuf {
        let relative = self.lang_prefix(lang).join(&self.relative);
        self.output_dir.join(with_added_extension(&relative, "html"))
    }

    /// Every dependency known for `lang` at `level`, including the deferred ones.
    pub fn dependencies(&self, lang: &str, level: DependencyLevel) -> eyre::Result<Vec<Dependency>> {
        let mut result = self
            .dependencies
            .get(&(lang.to_string(), level))
            .cloned()
            .unwrap_or_default();
        for deferred in self.deferred.iter().filter(|d| d.lang == lang && d.level == level) {
            result.extend(deferred.resolve(self)?);
        }
        Ok(result)
    }

    /// Whether the page for `lang` can be reused: it and its sidecar exist,
    /// no file dependency is newer than the page, and every current uptodate
    /// dependency equals one recorded by the last build.
    pub fn is_uptodate(&self, lang: &str) -> eyre::Result<bool> {
        let Some(built) = modified(&self.destination(lang)) else {
            return Ok(false);
        };
        if !dependency_file(self, lang).is_file() {
            return Ok(false);
        }
        for level in DependencyLevel::ALL {
            for dep in self.dependencies(lang, level)? {
                let Dependency::File(file) = dep else { continue };
                match modified(Utf8Path::new(&file)) {
                    Some(time) if time <= built => {}
                    _ => {
                        tracing::debug!("{} is newer than {}", file, self.destination(lang));
                        return Ok(false);
                    }
                }
            }
            let uptodate = self
                .deferred
                .iter()
                .filter(|d| d.lang == lang && d.level == level && d.kind == DependencyKind::Uptodate);
            for deferred in uptodate {
                let recorded = deferred.recorded()?;
                if deferred.current(self).iter().any(|dep| !recorded.contains(dep)) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl Post for PagePost {
    fn translated_base_path(&self, lang: &str) -> Utf8PathBuf {
        let relative = self.lang_prefix(lang).join(&self.relative);
        self.cache_dir.join(POST_CACHE_DIR_NAME).join(with_added_extension(&relative, "html"))
    }

    fn add_dependency(&mut self, dependency: Dependency, level: DependencyLevel, lang: &str) {
        self.dependencies
            .entry((lang.to_string(), level))
            .or_default()
            .push(dependency);
    }

    fn add_deferred_dependencies(&mut self, deferred: DeferredDependencies) {
        self.deferred.push(deferred);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UptodateDependency;

    /// Reports one configuration entry for uptodate fragment dependencies.
    struct Settings(serde_json::Value);

    impl ExtraDependencies for Settings {
        fn extra_deps(&self, _: &dyn Post, _: &str, kind: DependencyKind, level: DependencyLevel) -> Vec<Dependency> {
            match (kind, level) {
                (DependencyKind::Uptodate, DependencyLevel::Fragment) => {
                    vec![Dependency::Uptodate(UptodateDependency::new("c", self.0.clone()))]
                }
                _ => vec![],
            }
        }
    }

    fn post() -> PagePost {
        PagePost::new(Utf8Path::new("notes/intro.tex"), Utf8Path::new("cache"), Utf8Path::new("output"), "en")
    }

    #[test]
    fn test_paths() {
        let post = post();
        assert_eq!(post.translated_base_path("en"), "cache/posts/notes/intro.html");
        assert_eq!(post.translated_base_path("de"), "cache/posts/de/notes/intro.html");
        assert_eq!(post.destination("en"), "output/notes/intro.html");
        assert_eq!(post.destination("de"), "output/de/notes/intro.html");
        assert_eq!(dependency_file(&post, "de"), "cache/posts/de/notes/intro.html.ltxdep");
    }

    #[test]
    fn test_deferred_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Utf8PathBuf::from_path_buf(dir.path().join("a.ltxdep")).unwrap();
        DependencySidecar(vec!["x.png".into()], vec![], vec![], vec![]).write(&sidecar).unwrap();

        let mut post = post();
        post.add_dependency(Dependency::File("direct".into()), DependencyLevel::Fragment, "en");
        let settings: Arc<dyn ExtraDependencies> = Arc::new(Settings(serde_json::json!({})));
        for kind in [DependencyKind::File, DependencyKind::Uptodate] {
            post.add_deferred_dependencies(DeferredDependencies {
                sidecar: sidecar.clone(),
                lang: "en".into(),
                kind,
                level: DependencyLevel::Fragment,
                extra: Arc::clone(&settings),
            });
        }

        let deps = post.dependencies("en", DependencyLevel::Fragment).unwrap();
        assert_eq!(
            deps,
            vec![
                Dependency::File("direct".into()),
                Dependency::File("x.png".into()),
                Dependency::Uptodate(UptodateDependency::new("c", serde_json::json!({}))),
            ]
        );
        assert!(post.dependencies("de", DependencyLevel::Fragment).unwrap().is_empty());
    }

    fn registered(root: &Utf8Path, config: serde_json::Value) -> PagePost {
        let mut post = PagePost::new(Utf8Path::new("a.tex"), &root.join("cache"), &root.join("output"), "en");
        let settings: Arc<dyn ExtraDependencies> = Arc::new(Settings(config));
        for level in DependencyLevel::ALL {
            for kind in [DependencyKind::File, DependencyKind::Uptodate] {
                post.add_deferred_dependencies(DeferredDependencies {
                    sidecar: dependency_file(&post, "en"),
                    lang: "en".into(),
                    kind,
                    level,
                    extra: Arc::clone(&settings),
                });
            }
        }
        post
    }

    #[test]
    fn test_is_uptodate() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let source = root.join("a.tex");
        std::fs::write(&source, "text").unwrap();

        let post = registered(&root, serde_json::json!({"scale": 1}));
        assert!(!post.is_uptodate("en").unwrap());

        let dest = post.destination("en");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "<p>text</p>").unwrap();
        assert!(!post.is_uptodate("en").unwrap());

        let recorded = UptodateDependency::new("c", serde_json::json!({"scale": 1}));
        DependencySidecar(vec![source.to_string()], vec![], vec![recorded], vec![])
            .write(&dependency_file(&post, "en"))
            .unwrap();
        assert!(post.is_uptodate("en").unwrap());
        assert!(!registered(&root, serde_json::json!({"scale": 2})).is_uptodate("en").unwrap());

        let older = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options().write(true).open(&dest).unwrap().set_modified(older).unwrap();
        assert!(!post.is_uptodate("en").unwrap());
    }
}
