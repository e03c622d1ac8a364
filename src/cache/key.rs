// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Query identities.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Identity of a cached backend query: owning scope (the session user),
/// resource path and parameters.
///
/// Parameters live in a `BTreeMap`, so insertion order never affects
/// equality or serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    pub scope: String,
    pub resource: String,
    pub params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            scope: String::new(),
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    /// Restrict the key to one user so cached data never crosses sessions.
    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Stable serialized form: `[scope, resource, {params...}]`.
    pub fn serialized(&self) -> String {
        serde_json::json!([self.scope, self.resource, self.params]).to_string()
    }

    /// Filesystem-safe key for the durable store.
    pub fn storage_key(&self) -> String {
        hex::encode(Sha256::digest(self.serialized().as_bytes()))
    }
}
