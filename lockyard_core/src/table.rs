use std::fmt;

use crossbeam_skiplist::SkipMap;

use crate::lock::LockEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceType(pub u32);

impl ResourceType {
    #[inline]
    pub fn type_id(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceType({})", self.0)
    }
}

// One map of resource id to lock instance per resource type. Never iterated
// globally; entries are only touched through clients that know the key.
// Writing methods expect a validated type_id.
pub struct LockTable {
    maps: Box<[SkipMap<u64, LockEntry>]>,
}

impl LockTable {
    pub fn new(resource_types: usize) -> Self {
        let mut maps = Vec::with_capacity(resource_types);
        for _ in 0..resource_types {
            maps.push(SkipMap::new());
        }
        Self {
            maps: maps.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn resource_types(&self) -> usize {
        self.maps.len()
    }

    pub fn get(&self, type_id: usize, resource_id: u64) -> Option<LockEntry> {
        self.maps
            .get(type_id)?
            .get(&resource_id)
            .map(|entry| entry.value().clone())
    }

    // None on success, otherwise the entry currently mapped at the key.
    pub fn put_if_absent(
        &self,
        type_id: usize,
        resource_id: u64,
        entry: LockEntry,
    ) -> Option<LockEntry> {
        let slot = self.maps[type_id].get_or_insert(resource_id, entry.clone());
        if slot.value().same_instance(&entry) {
            None
        } else {
            Some(slot.value().clone())
        }
    }

    // Only for the downgrade path, where the caller owns the resident entry.
    pub fn replace(&self, type_id: usize, resource_id: u64, entry: LockEntry) {
        self.maps[type_id].insert(resource_id, entry);
    }

    pub fn remove(&self, type_id: usize, resource_id: u64) {
        self.maps[type_id].remove(&resource_id);
    }

    pub fn resource_count(&self, type_id: usize) -> usize {
        self.maps.get(type_id).map_or(0, |map| map.len())
    }
}
