// Copyright (c) 2025 Kodama Project. All rights reserved.
// Released under the GPL-3.0 license as described in the file LICENSE.
// Authors: Kokic (@kokic)

use std::collections::BTreeMap;

use eyre::{eyre, WrapErr};
use serde::{Deserialize, Serialize};

use crate::context::{LinkTarget, StaticLinkProvider};

/// `[links.<site>]`: labels of an external site.
#[derive(Deserialize, Debug, Default, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Site {
    /// Relative label URLs are joined onto this.
    pub base_url: Option<String>,
    pub labels: BTreeMap<String, LinkTarget>,
    /// Sources, relative to the source directory, that may reference this
    /// site. Empty means every source.
    pub sources: Vec<String>,
}

impl Site {
    pub fn provider(&self, name: &str) -> eyre::Result<StaticLinkProvider> {
        let base_url = match &self.base_url {
            Some(base_url) => Some(
                url::Url::parse(base_url)
                    .wrap_err_with(|| eyre!("invalid base url `{}` of site `{}`", base_url, name))?,
            ),
            None => None,
        };
        Ok(StaticLinkProvider::new(name, base_url, self.labels.clone()))
    }
}
