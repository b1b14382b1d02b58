//! Registry of published camera paths.
//!
//! Each id maps to its current `ResourceRecord` plus the opaque geometry
//! bytes published with it. Publishing is last-writer-wins: the increment
//! and store happen under the shard write lock for that id, so two
//! concurrent publishes to one id always produce distinct, consecutive
//! versions. `publish_if_version` layers an optimistic check on top for
//! callers that read a version first and must not clobber a newer one.
//!
//! Removing an id leaves a tombstone holding its last version. The id reads
//! as absent, but a later publish continues from that version, so a version
//! number is never handed out twice for the same id.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keyframe_sim::PlayerId;
use keyframe_wire::{ResourceRecord, Version};
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

/// Shared, immutable path geometry.
pub type Geometry = Arc<[u8]>;

fn empty_geometry() -> Geometry {
    Geometry::from(Vec::new())
}

#[derive(Debug, Clone)]
struct PathEntry {
    record: ResourceRecord,
    geometry: Geometry,
    /// Tombstone: the id was removed; `record.version` is the last one used.
    removed: bool,
}

impl PathEntry {
    fn live(&self) -> Option<&Self> {
        (!self.removed).then_some(self)
    }
}

/// In-memory map from resource id to its authoritative definition.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    paths: DashMap<String, PathEntry>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: &str) -> Option<ResourceRecord> {
        let entry = self.paths.get(id)?;
        entry.live().map(|entry| entry.record.clone())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.paths.get(id).is_some_and(|entry| !entry.removed)
    }

    /// Record and geometry of `id`, read together.
    pub fn get_with_geometry(&self, id: &str) -> Option<(ResourceRecord, Geometry)> {
        let entry = self.paths.get(id)?;
        entry
            .live()
            .map(|entry| (entry.record.clone(), Arc::clone(&entry.geometry)))
    }

    pub fn geometry(&self, id: &str) -> Option<Geometry> {
        let entry = self.paths.get(id)?;
        entry.live().map(|entry| Arc::clone(&entry.geometry))
    }

    /// All published ids in ascending order.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .paths
            .iter()
            .filter(|entry| !entry.removed)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// All published records, ordered by id ascending.
    pub fn list_records(&self) -> Vec<ResourceRecord> {
        let mut records: Vec<ResourceRecord> = self
            .paths
            .iter()
            .filter(|entry| !entry.removed)
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Bump `id` to its next version (creating it at version 1), keeping
    /// any geometry already stored.
    pub fn publish(&self, id: &str, modifier: PlayerId) -> ServerResult<ResourceRecord> {
        self.publish_inner(id, modifier, None, None)
    }

    /// As `publish`, replacing the stored geometry in the same step.
    pub fn publish_with_geometry(
        &self,
        id: &str,
        modifier: PlayerId,
        geometry: impl Into<Geometry>,
    ) -> ServerResult<ResourceRecord> {
        self.publish_inner(id, modifier, None, Some(geometry.into()))
    }

    /// Publish only if the stored version equals `expected_version`
    /// (`0` means "must not exist yet", which a removed id satisfies).
    pub fn publish_if_version(
        &self,
        id: &str,
        expected_version: Version,
        modifier: PlayerId,
        geometry: Option<Geometry>,
    ) -> ServerResult<ResourceRecord> {
        self.publish_inner(id, modifier, Some(expected_version), geometry)
    }

    fn publish_inner(
        &self,
        id: &str,
        modifier: PlayerId,
        expected_version: Option<Version>,
        geometry: Option<Geometry>,
    ) -> ServerResult<ResourceRecord> {
        if id.is_empty() {
            return Err(ServerError::InvalidResourceId);
        }

        let record = match self.paths.entry(id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let last = entry.record.version;
                let visible = if entry.removed { 0 } else { last };
                if let Some(expected) = expected_version
                    && expected != visible
                {
                    return Err(ServerError::VersionConflict {
                        id: id.to_string(),
                        expected,
                        actual: visible,
                    });
                }
                let next = last
                    .checked_add(1)
                    .ok_or_else(|| ServerError::VersionExhausted(id.to_string()))?;

                entry.record.version = next;
                entry.record.last_modifier = modifier;
                match geometry {
                    Some(geometry) => entry.geometry = geometry,
                    None if entry.removed => entry.geometry = empty_geometry(),
                    None => {}
                }
                entry.removed = false;
                entry.record.clone()
            }
            Entry::Vacant(vacant) => {
                if let Some(expected) = expected_version
                    && expected != 0
                {
                    return Err(ServerError::VersionConflict {
                        id: id.to_string(),
                        expected,
                        actual: 0,
                    });
                }
                let record = ResourceRecord::new(id, 1, modifier);
                vacant.insert(PathEntry {
                    record: record.clone(),
                    geometry: geometry.unwrap_or_else(empty_geometry),
                    removed: false,
                });
                record
            }
        };

        info!(
            id = %record.id,
            version = record.version,
            modifier = %record.last_modifier,
            "camera path published"
        );
        Ok(record)
    }

    /// Install a fully decoded record (e.g. loaded from storage) if it is
    /// newer than the stored one, removed or not. Returns whether it was
    /// installed.
    pub fn install(
        &self,
        record: ResourceRecord,
        geometry: impl Into<Geometry>,
    ) -> ServerResult<bool> {
        record.validate()?;
        let entry = PathEntry {
            record: record.clone(),
            geometry: geometry.into(),
            removed: false,
        };
        let installed = match self.paths.entry(record.id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().record.version >= record.version {
                    false
                } else {
                    occupied.insert(entry);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        };
        debug!(id = %record.id, version = record.version, installed, "install camera path");
        Ok(installed)
    }

    /// Remove `id`, returning its last record. The version counter survives.
    pub fn remove(&self, id: &str) -> Option<ResourceRecord> {
        let mut entry = self.paths.get_mut(id)?;
        if entry.removed {
            return None;
        }
        entry.removed = true;
        entry.geometry = empty_geometry();
        let record = entry.record.clone();
        drop(entry);

        info!(id = %record.id, version = record.version, "camera path removed");
        Some(record)
    }

    /// Number of live (not removed) paths.
    pub fn len(&self) -> usize {
        self.paths.iter().filter(|entry| !entry.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
