// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::collections::BTreeMap;

const ENGLISH: [(&str, &str); 11] = [
    ("definition", "Definition"),
    ("definitions", "Definitions"),
    ("lemma", "Lemma"),
    ("proposition", "Proposition"),
    ("theorem", "Theorem"),
    ("corollary", "Corollary"),
    ("example", "Example"),
    ("examples", "Examples"),
    ("remark", "Remark"),
    ("remarks", "Remarks"),
    ("proof", "Proof"),
];

const GERMAN: [(&str, &str); 11] = [
    ("definition", "Definition"),
    ("definitions", "Definitionen"),
    ("lemma", "Lemma"),
    ("proposition", "Proposition"),
    ("theorem", "Satz"),
    ("corollary", "Korollar"),
    ("example", "Beispiel"),
    ("examples", "Beispiele"),
    ("remark", "Bemerkung"),
    ("remarks", "Bemerkungen"),
    ("proof", "Beweis"),
];

/// Titles of the theorem-like environments in `lang`, keyed by environment
/// name. Languages without a built-in table fall back to English; `overrides`
/// replaces individual titles.
pub fn theorem_names(lang: &str, overrides: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
    let table = match lang.split(['_', '-']).next() {
        Some("de") => &GERMAN,
        _ => &ENGLISH,
    };
    let mut names: BTreeMap<String, String> = table
        .iter()
        .map(|(kind, name)| (kind.to_string(), name.to_string()))
        .collect();
    if let Some(overrides) = overrides {
        names.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    names
}
