// Proxy Control - Named Profiles
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Named proxy profiles and the ordered table that holds them.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::proxy::ProxyProfile;

/// A proxy profile stored under a unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedProfile {
    pub name: String,
    pub profile: ProxyProfile,
}

impl NamedProfile {
    pub fn new(name: impl Into<String>, profile: ProxyProfile) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }
}

/// Profiles keyed by name, in insertion order.
///
/// Serializes as a JSON object `{ name: ProfileObject, ... }`. Document order
/// is kept on load so "first match" lookups are stable across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTable {
    entries: Vec<NamedProfile>,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ProxyProfile> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.profile)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedProfile> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Insert or overwrite. An existing entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, profile: ProxyProfile) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].profile = profile,
            None => self.entries.push(NamedProfile::new(name, profile)),
        }
    }

    /// Replace `old` in place with `(new, profile)`. Returns false if `old`
    /// is absent. The caller guarantees `new` does not collide.
    pub fn replace(&mut self, old: &str, new: impl Into<String>, profile: ProxyProfile) -> bool {
        let Some(i) = self.position(old) else {
            return false;
        };
        self.entries[i] = NamedProfile::new(new, profile);
        true
    }

    /// Keep only the entries for which `keep` returns true. Order is kept.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&NamedProfile) -> bool,
    {
        self.entries.retain(keep);
    }

    pub fn remove(&mut self, name: &str) -> Option<ProxyProfile> {
        let i = self.position(name)?;
        Some(self.entries.remove(i).profile)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }
}

impl Serialize for ProfileTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &entry.profile)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProfileTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProfileTableVisitor;

        impl<'de> Visitor<'de> for ProfileTableVisitor {
            type Value = ProfileTable;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of profile names to proxy profiles")
            }

            fn visit_map<A>(self, mut access: A) -> Result<ProfileTable, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut table = ProfileTable::new();
                while let Some((name, profile)) = access.next_entry::<String, ProxyProfile>()? {
                    table.insert(name, profile);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(ProfileTableVisitor)
    }
}
