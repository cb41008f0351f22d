// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use camino::Utf8Path;
use eyre::{eyre, WrapErr};
use serde::{Deserialize, Serialize};

use super::plugin::{Dependency, DependencyKind, DependencyLevel};
use crate::context::{LatexContext, UptodateDependency};

pub const DEPENDENCY_EXTENSION: &str = "ltxdep";

/// The `.ltxdep` sidecar: `[file_deps_fragment, file_deps_page,
/// uptodate_fragment, uptodate_page]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencySidecar(
    pub Vec<String>,
    pub Vec<String>,
    pub Vec<UptodateDependency>,
    pub Vec<UptodateDependency>,
);

impl DependencySidecar {
    pub fn from_context(ctx: &LatexContext) -> Self {
        DependencySidecar(
            ctx.file_dependencies_fragment(),
            ctx.file_dependencies_page(),
            ctx.uptodate_dependencies_fragment().to_vec(),
            ctx.uptodate_dependencies_page().to_vec(),
        )
    }

    pub fn write(&self, path: &Utf8Path) -> eyre::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| eyre!("failed to create directory `{}`", parent))?;
        }
        let serialized = serde_json::to_string(self)?;
        std::fs::write(path, serialized).wrap_err_with(|| eyre!("failed to write dependencies to `{}`", path))
    }

    /// Reads a sidecar. A missing file, or JSON which is not a 4-element
    /// array, counts as no recorded dependencies.
    pub fn read(path: &Utf8Path) -> eyre::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).wrap_err_with(|| eyre!("failed to read `{}`", path))?;
        let value: serde_json::Value =
            serde_json::from_str(&content).wrap_err_with(|| eyre!("failed to parse dependencies in `{}`", path))?;
        match value.as_array().map(Vec::len) {
            Some(4) => serde_json::from_value(value).wrap_err_with(|| eyre!("malformed dependencies in `{}`", path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn select(&self, kind: DependencyKind, level: DependencyLevel) -> Vec<Dependency> {
        let files = |files: &[String]| files.iter().cloned().map(Dependency::File).collect();
        let uptodate = |deps: &[UptodateDependency]| deps.iter().cloned().map(Dependency::Uptodate).collect();
        match (kind, level) {
            (DependencyKind::File, DependencyLevel::Fragment) => files(&self.0),
            (DependencyKind::File, DependencyLevel::Page) => files(&self.1),
            (DependencyKind::Uptodate, DependencyLevel::Fragment) => uptodate(&self.2),
            (DependencyKind::Uptodate, DependencyLevel::Page) => uptodate(&self.3),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::context::AddTo;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let mut ctx = LatexContext::new(1, "en", BTreeMap::new(), None);
        ctx.add_file_dependency("images/b.png", AddTo::Both);
        ctx.add_file_dependency("images/a.png", AddTo::Fragment);
        ctx.add_uptodate_dependency(UptodateDependency::new("x", serde_json::json!({"k": [1, 2]})), AddTo::Page);
        let sidecar = DependencySidecar::from_context(&ctx);

        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "nested/post.html.ltxdep");
        sidecar.write(&path).unwrap();
        assert_eq!(DependencySidecar::read(&path).unwrap(), sidecar);

        let json = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            json,
            r#"[["images/a.png","images/b.png"],["images/b.png"],[],[{"name":"x","deps":{"k":[1,2]}}]]"#
        );
    }

    #[test]
    fn test_read_missing_or_foreign() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(DependencySidecar::read(&temp_path(&dir, "none")).unwrap(), Default::default());

        let path = temp_path(&dir, "short");
        std::fs::write(&path, "[[], []]").unwrap();
        assert_eq!(DependencySidecar::read(&path).unwrap(), Default::default());

        std::fs::write(&path, "[[").unwrap();
        assert!(DependencySidecar::read(&path).is_err());
    }

    #[test]
    fn test_select() {
        let sidecar = DependencySidecar(
            vec!["a".into()],
            vec!["b".into()],
            vec![UptodateDependency::new("u", serde_json::json!(1))],
            vec![],
        );
        assert_eq!(
            sidecar.select(DependencyKind::File, DependencyLevel::Page),
            vec![Dependency::File("b".into())]
        );
        assert_eq!(sidecar.select(DependencyKind::Uptodate, DependencyLevel::Fragment).len(), 1);
        assert!(sidecar.select(DependencyKind::Uptodate, DependencyLevel::Page).is_empty());
    }
}
