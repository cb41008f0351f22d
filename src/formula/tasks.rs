// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
};

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{eyre, WrapErr};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{
    cache::FormulaCache,
    pipeline::{FormulaPipeline, OutputFormat},
    size::{data_uri, image_size},
    FormulaError, FormulaRecord, FormulaType,
};
use crate::context::UptodateDependency;

pub const TASK_BASENAME: &str = "latex_formula_renderer";
pub const TASK_STATE_FILE: &str = "tasks.db.json";

/// Where a rendered formula can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFormula {
    /// Either a URL below the output prefix or a data URI.
    pub src: String,
    pub width: u32,
    pub height: u32,
}

/// Lists the formulae some part of the site needs as images.
pub trait FormulaCollector: Send + Sync {
    fn collect(&self) -> eyre::Result<Vec<FormulaRecord>>;
}

/// Reads the formula sidecars written during compilation: the given
/// `.ltxfor` files plus every `.texfor` below the extra sources directory.
pub struct SidecarCollector {
    files: Vec<Utf8PathBuf>,
    extra_sources: Utf8PathBuf,
}

impl SidecarCollector {
    pub fn new(files: Vec<Utf8PathBuf>, extra_sources: &Utf8Path) -> Self {
        SidecarCollector {
            files,
            extra_sources: extra_sources.to_owned(),
        }
    }

    fn candidates(&self) -> BTreeSet<Utf8PathBuf> {
        let mut candidates: BTreeSet<Utf8PathBuf> = self.files.iter().cloned().collect();
        let extra = WalkDir::new(&self.extra_sources)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
            .filter(|path| path.as_str().ends_with(".texfor"));
        candidates.extend(extra);
        candidates
    }
}

impl FormulaCollector for SidecarCollector {
    fn collect(&self) -> eyre::Result<Vec<FormulaRecord>> {
        let mut formulae = Vec::new();
        for path in self.candidates().iter().filter(|path| path.is_file()) {
            let content = std::fs::read_to_string(path).wrap_err_with(|| eyre!("failed to read `{}`", path))?;
            let records: Vec<FormulaRecord> =
                serde_json::from_str(&content).wrap_err_with(|| eyre!("failed to parse formulae in `{}`", path))?;
            formulae.extend(records);
        }
        Ok(formulae)
    }
}

/// `folder` as a URL prefix starting and ending with `/`.
pub fn output_prefix(folder: &str) -> String {
    match folder.trim_matches('/') {
        "" => "/".to_string(),
        folder => format!("/{}/", folder),
    }
}

/// Keeps characters that are safe in every tool's file names.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Renders formulae through the cache and places them in the output.
pub struct FormulaService {
    cache: FormulaCache,
    pipeline: FormulaPipeline,
    output_dir: Utf8PathBuf,
    output_prefix: String,
    as_data_uri: bool,
    collectors: Vec<Box<dyn FormulaCollector>>,
}

impl FormulaService {
    /// Images go to `<output_root>/<folder>` and are linked as `/<folder>/`.
    pub fn new(
        cache: FormulaCache,
        pipeline: FormulaPipeline,
        output_root: &Utf8Path,
        folder: &str,
        as_data_uri: bool,
    ) -> Self {
        FormulaService {
            cache,
            pipeline,
            output_dir: output_root.join(folder.trim_matches('/')),
            output_prefix: output_prefix(folder),
            as_data_uri,
            collectors: Vec::new(),
        }
    }

    pub fn add_collector(&mut self, collector: Box<dyn FormulaCollector>) {
        self.collectors.push(collector);
    }

    /// Where the inputs of the formula tasks that ran are remembered.
    pub fn task_state_file(&self) -> Utf8PathBuf {
        self.cache.cache_dir().join(TASK_STATE_FILE)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.pipeline.output_format
    }

    fn file_name(&self, base_name: &str) -> String {
        format!("{}.{}", base_name, self.output_format().extension())
    }

    /// Image bytes for `base_name`, from the cache or freshly rendered.
    fn generate(&self, base_name: &str, record: &FormulaRecord) -> Result<Vec<u8>, FormulaError> {
        let file_name = self.file_name(base_name);
        if let Some(data) = self.cache.get_content(&file_name) {
            return Ok(data);
        }
        let data = self.pipeline.render(
            &record.body,
            &record.kind,
            record.color,
            record.scale,
            &sanitize_name(base_name),
        )?;
        self.cache.put_content(&file_name, &data);
        Ok(data)
    }

    fn write_formula(&self, data: &[u8], base_name: &str) -> Result<Utf8PathBuf, FormulaError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(self.file_name(base_name));
        std::fs::write(&path, data)?;
        Ok(path)
    }

    pub fn compile(
        &self,
        body: &str,
        color: [f64; 3],
        scale: f64,
        kind: &FormulaType,
    ) -> Result<CompiledFormula, FormulaError> {
        let record = FormulaRecord {
            body: body.to_string(),
            color,
            scale,
            kind: kind.clone(),
        };
        let base_name = self.cache.get_base_name(kind, body, color, scale);
        let data = self.generate(&base_name, &record)?;
        let (width, height) = image_size(&data, self.output_format())?;
        let src = match self.as_data_uri {
            true => data_uri(&data, self.output_format()),
            false => {
                self.write_formula(&data, &base_name)?;
                format!("{}{}", self.output_prefix, self.file_name(&base_name))
            }
        };
        Ok(CompiledFormula { src, width, height })
    }

    /// One task per distinct image the collectors ask for. Data URIs need no
    /// files, so there are no tasks in that mode.
    pub fn gen_tasks(&self) -> eyre::Result<Vec<FormulaTask>> {
        if self.as_data_uri {
            return Ok(vec![]);
        }
        let mut formulae = Vec::new();
        for collector in &self.collectors {
            formulae.extend(collector.collect()?);
        }
        formulae.sort();
        formulae.dedup();

        let base_names = self.cache.get_base_names(&formulae);
        let mut generated = BTreeSet::new();
        let mut tasks = Vec::new();
        for (base_name, record) in base_names.into_iter().zip(formulae) {
            let destination = self.output_dir.join(self.file_name(&base_name));
            if generated.insert(destination.clone()) {
                tasks.push(FormulaTask {
                    destination,
                    base_name,
                    record,
                });
            }
        }
        Ok(tasks)
    }
}

/// Renders one formula image into the output directory.
#[derive(Debug, Clone)]
pub struct FormulaTask {
    pub destination: Utf8PathBuf,
    pub base_name: String,
    pub record: FormulaRecord,
}

impl FormulaTask {
    pub fn name(&self) -> String {
        format!("{}:{}", TASK_BASENAME, self.destination)
    }

    /// The task's inputs; it is stale when they change.
    pub fn uptodate(&self) -> UptodateDependency {
        let record = &self.record;
        let deps = serde_json::json!({
            "0": record.body,
            "1": record.color,
            "2": record.scale,
            "3": record.kind,
        });
        UptodateDependency::new(self.name(), deps)
    }

    /// The image exists and was produced from the inputs the task has now.
    pub fn is_uptodate(&self, state: &TaskState) -> bool {
        self.destination.is_file() && state.0.get(&self.name()) == Some(&self.uptodate().deps)
    }

    pub fn run(&self, service: &FormulaService) -> Result<(), FormulaError> {
        let data = service.generate(&self.base_name, &self.record)?;
        service.write_formula(&data, &self.base_name)?;
        Ok(())
    }
}

/// The uptodate entries of the formula tasks that last ran, keyed by task name.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskState(BTreeMap<String, serde_json::Value>);

impl TaskState {
    /// A missing or unreadable state file counts as no task having run.
    pub fn read(path: &Utf8Path) -> Self {
        if !path.is_file() {
            return Self::default();
        }
        let read = || -> eyre::Result<Self> { Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?) };
        match read() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Error on reading formula task state {}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn write(&self, path: &Utf8Path) -> eyre::Result<()> {
        let dir = path.parent().unwrap_or(Utf8Path::new("."));
        std::fs::create_dir_all(dir).wrap_err_with(|| eyre!("failed to create directory `{}`", dir))?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(serde_json::to_string(self)?.as_bytes())?;
        file.persist(path)
            .wrap_err_with(|| eyre!("failed to write formula task state to `{}`", path))?;
        Ok(())
    }

    pub fn record(&mut self, task: &FormulaTask) {
        let uptodate = task.uptodate();
        self.0.insert(uptodate.name, uptodate.deps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<FormulaRecord>);

    impl FormulaCollector for Fixed {
        fn collect(&self) -> eyre::Result<Vec<FormulaRecord>> {
            Ok(self.0.clone())
        }
    }

    fn record(body: &str, kind: FormulaType) -> FormulaRecord {
        FormulaRecord {
            body: body.to_string(),
            color: [0.0; 3],
            scale: 1.25,
            kind,
        }
    }

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn service(root: &Utf8Path, as_data_uri: bool) -> FormulaService {
        let pipeline = FormulaPipeline {
            output_format: OutputFormat::Svg,
            ..Default::default()
        };
        let cache = FormulaCache::new(&root.join("cache/formulae"));
        FormulaService::new(cache, pipeline, &root.join("output"), "/formulae", as_data_uri)
    }

    const SVG: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg" width="9pt" height="4.5pt"></svg>"#;

    /// Puts an image into the cache so no TeX run is needed.
    fn seed(service: &FormulaService, body: &str, kind: &FormulaType) -> String {
        let base_name = service.cache.get_base_name(kind, body, [0.0; 3], 1.25);
        assert!(service.cache.put_content(&format!("{}.svg", base_name), SVG));
        base_name
    }

    #[test]
    fn test_output_prefix() {
        assert_eq!(output_prefix(""), "/");
        assert_eq!(output_prefix("/"), "/");
        assert_eq!(output_prefix("formulae"), "/formulae/");
        assert_eq!(output_prefix("/a/b/"), "/a/b/");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("aB9-_x=."), "aB9__x__");
    }

    #[test]
    fn test_compile_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let service = service(&root, false);
        let base_name = seed(&service, "x^2", &FormulaType::Inline);

        let compiled = service.compile("x^2", [0.0; 3], 1.25, &FormulaType::Inline).unwrap();
        assert_eq!(compiled.src, format!("/formulae/{}.svg", base_name));
        assert_eq!((compiled.width, compiled.height), (16, 8));
        let written = root.join("output/formulae").join(format!("{}.svg", base_name));
        assert_eq!(std::fs::read(written).unwrap(), SVG);
    }

    #[test]
    fn test_compile_as_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let service = service(&root, true);
        seed(&service, "y", &FormulaType::Display);

        let compiled = service.compile("y", [0.0; 3], 1.25, &FormulaType::Display).unwrap();
        assert!(compiled.src.starts_with("data:image/svg+xml;base64,"));
        assert!(!root.join("output").exists());
        assert!(service.gen_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_gen_tasks_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let mut service = service(&root, false);
        service.add_collector(Box::new(Fixed(vec![
            record("b", FormulaType::Inline),
            record("a", FormulaType::Inline),
        ])));
        service.add_collector(Box::new(Fixed(vec![
            record("a", FormulaType::Inline),
            record(" a ", FormulaType::Inline),
        ])));

        let tasks = service.gen_tasks().unwrap();
        assert_eq!(tasks.len(), 2);
        // " a " sorts first and shares its name with "a".
        assert_eq!(tasks[0].record.body, " a ");
        assert_eq!(tasks[1].record.body, "b");
        assert!(tasks.iter().all(|task| task.destination.starts_with(&service.output_dir)));
        assert_eq!(tasks[1].uptodate().deps["3"], "inline");
        assert_eq!(tasks[1].uptodate().name, tasks[1].name());
    }

    #[test]
    fn test_task_run() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let mut service = service(&root, false);
        seed(&service, "z", &FormulaType::Inline);
        service.add_collector(Box::new(Fixed(vec![record("z", FormulaType::Inline)])));

        let tasks = service.gen_tasks().unwrap();
        let mut state = TaskState::default();
        assert!(!tasks[0].is_uptodate(&state));
        tasks[0].run(&service).unwrap();
        assert!(!tasks[0].is_uptodate(&state));
        state.record(&tasks[0]);
        assert!(tasks[0].is_uptodate(&state));
    }

    #[test]
    fn test_task_state() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let mut service = service(&root, false);
        seed(&service, "z", &FormulaType::Inline);
        service.add_collector(Box::new(Fixed(vec![record("z", FormulaType::Inline)])));
        let task = service.gen_tasks().unwrap().remove(0);
        task.run(&service).unwrap();

        let path = service.task_state_file();
        assert_eq!(path, root.join("cache/formulae/tasks.db.json"));
        assert_eq!(TaskState::read(&path), TaskState::default());
        let mut state = TaskState::default();
        state.record(&task);
        state.write(&path).unwrap();
        let state = TaskState::read(&path);
        assert!(task.is_uptodate(&state));

        let mut recolored = task.clone();
        recolored.record.color = [1.0, 0.0, 0.0];
        assert!(!recolored.is_uptodate(&state));

        std::fs::remove_file(&task.destination).unwrap();
        assert!(!task.is_uptodate(&state));

        std::fs::write(&path, "{").unwrap();
        assert_eq!(TaskState::read(&path), TaskState::default());
    }

    #[test]
    fn test_sidecar_collector() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let post = root.join("cache/posts/a.html.ltxfor");
        std::fs::create_dir_all(post.parent().unwrap()).unwrap();
        std::fs::write(&post, r#"[["x",[0.0,0.0,0.0],1.25,"inline"]]"#).unwrap();

        let extra = root.join("cache/extra-formula-sources");
        std::fs::create_dir_all(extra.join("notes/b.tex")).unwrap();
        std::fs::write(
            extra.join("notes/b.tex/.texfor"),
            r#"[["\\draw (0,0);",[1.0,0.0,0.0],1.0,["tikzpicture",null]]]"#,
        )
        .unwrap();
        std::fs::write(extra.join("notes/ignored.json"), "[]").unwrap();

        let missing = root.join("cache/posts/none.html.ltxfor");
        let collector = SidecarCollector::new(vec![post, missing], &extra);
        let mut formulae = collector.collect().unwrap();
        formulae.sort();
        assert_eq!(formulae.len(), 2);
        assert_eq!(formulae[0].body, "\\draw (0,0);");
        assert_eq!(formulae[0].kind, FormulaType::TikzPicture(None));
        assert_eq!(formulae[1], record("x", FormulaType::Inline));
    }
}
