// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
    sync::{Mutex, PoisonError},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

use super::{pipeline::density, quantize_color_component, FormulaRecord, FormulaType};

pub const DATABASE_FILE: &str = "formulae.db.json";

/// `[search text -> base name, sorted base names]`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Database(BTreeMap<String, String>, BTreeSet<String>);

impl Database {
    fn get_or_insert(&mut self, search_text: String) -> (String, bool) {
        if let Some(base_name) = self.0.get(&search_text) {
            return (base_name.clone(), false);
        }
        let hash = URL_SAFE_NO_PAD.encode(Sha224::digest(search_text.as_bytes()));
        let mut base_name = hash.clone();
        let mut counter = 0;
        while self.1.contains(&base_name) {
            base_name = format!("{}-{}", hash, counter);
            counter += 1;
        }
        self.1.insert(base_name.clone());
        self.0.insert(search_text, base_name.clone());
        (base_name, true)
    }
}

/// The key a formula is named by.
pub fn search_text(kind: &FormulaType, body: &str, color: [f64; 3], scale: f64) -> String {
    let [r, g, b] = color.map(quantize_color_component);
    format!("{},{},{},{},{}:{}", kind.name(), r, g, b, density(scale), body.trim())
}

/// Names rendered formulae and stores their images.
///
/// Names are deterministic: the first formula with a given search text gets
/// the hash of that text, later collisions get `-0`, `-1`, ... appended. The
/// assignment is persisted in `formulae.db.json` so names stay stable across
/// runs.
pub struct FormulaCache {
    cache_dir: Utf8PathBuf,
    database: Mutex<Option<Database>>,
}

impl FormulaCache {
    pub fn new(cache_dir: &Utf8Path) -> Self {
        FormulaCache {
            cache_dir: cache_dir.to_owned(),
            database: Mutex::new(None),
        }
    }

    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    fn database_file(&self) -> Utf8PathBuf {
        self.cache_dir.join(DATABASE_FILE)
    }

    fn read_database(&self) -> Database {
        let path = self.database_file();
        let result = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
        match result {
            Ok(database) => database,
            Err(e) => {
                if path.exists() {
                    tracing::warn!("Error on reading formulae database: {}", e);
                }
                Database::default()
            }
        }
    }

    /// Replaces the database file atomically. Failures are logged.
    fn write_database(&self, database: &Database) {
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(&self.cache_dir)?;
            let mut file = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
            file.write_all(serde_json::to_string(database)?.as_bytes())?;
            file.persist(self.database_file())?;
            Ok(())
        };
        if let Err(e) = write() {
            tracing::warn!("Error on writing formulae database: {}", e);
        }
    }

    pub fn get_base_name(&self, kind: &FormulaType, body: &str, color: [f64; 3], scale: f64) -> String {
        let mut guard = self.database.lock().unwrap_or_else(PoisonError::into_inner);
        let database = guard.get_or_insert_with(|| self.read_database());
        let (base_name, inserted) = database.get_or_insert(search_text(kind, body, color, scale));
        if inserted {
            self.write_database(database);
        }
        base_name
    }

    /// Names a batch of formulae under one lock, writing the database at
    /// most once.
    pub fn get_base_names(&self, formulae: &[FormulaRecord]) -> Vec<String> {
        let mut guard = self.database.lock().unwrap_or_else(PoisonError::into_inner);
        let database = guard.get_or_insert_with(|| self.read_database());
        let mut changed = false;
        let names = formulae
            .iter()
            .map(|f| {
                let (base_name, inserted) = database.get_or_insert(search_text(&f.kind, &f.body, f.color, f.scale));
                changed |= inserted;
                base_name
            })
            .collect();
        if changed {
            self.write_database(database);
        }
        names
    }

    /// Cached bytes of `file_name`, if any.
    pub fn get_content(&self, file_name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.cache_dir.join(file_name)).ok()
    }

    /// Stores `content` under `file_name`. On failure the partial file is
    /// removed and `false` returned.
    pub fn put_content(&self, file_name: &str, content: &[u8]) -> bool {
        let path = self.cache_dir.join(file_name);
        let result = std::fs::create_dir_all(&self.cache_dir).and_then(|_| std::fs::write(&path, content));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Cannot store content into cache file {}: {}", path, e);
                _ = std::fs::remove_file(&path);
                false
            }
        }
    }
}
