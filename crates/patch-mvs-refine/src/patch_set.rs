use crate::{Observation, Patch, PatchError, PatchStatus};
use nalgebra::Point3;
use patch_mvs_core::Camera;
use std::collections::BTreeMap;

/// Patches keyed by id, iterated in ascending id order.
#[derive(Clone, Debug, Default)]
pub struct PatchSet {
    patches: BTreeMap<u32, Patch>,
    next_id: u32,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Reserve a fresh id.
    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Insert a patch under its own id.
    pub fn insert(&mut self, patch: Patch) -> Result<(), PatchError> {
        let id = patch.id();
        if self.patches.contains_key(&id) {
            return Err(PatchError::DuplicateId { id });
        }
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.patches.insert(id, patch);
        Ok(())
    }

    /// Create and insert a seed patch; returns its id.
    pub fn add_seed<C: Camera>(
        &mut self,
        center: Point3<f64>,
        color: [u8; 3],
        observations: &[Observation],
        cameras: &[C],
    ) -> Result<u32, PatchError> {
        let id = self.next_id;
        let patch = Patch::from_observations(id, center, color, observations, cameras)?;
        self.insert(patch)?;
        Ok(id)
    }

    /// Create and insert an expansion patch next to `parent`; returns its id.
    pub fn add_expansion<C: Camera>(
        &mut self,
        parent: u32,
        center: Point3<f64>,
        cameras: &[C],
    ) -> Result<u32, PatchError> {
        let id = self.next_id;
        let parent = self
            .patches
            .get(&parent)
            .ok_or(PatchError::UnknownPatch { id: parent })?;
        let patch = Patch::expand_from(parent, center, id, cameras)?;
        self.insert(patch)?;
        Ok(id)
    }

    pub fn get(&self, id: u32) -> Option<&Patch> {
        self.patches.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Patch> {
        self.patches.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Patch> {
        self.patches.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patch> {
        self.patches.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Patch> {
        self.patches.values_mut()
    }

    pub(crate) fn patches_mut(&mut self) -> &mut BTreeMap<u32, Patch> {
        &mut self.patches
    }

    pub fn count_with_status(&self, status: PatchStatus) -> usize {
        self.iter().filter(|p| p.status() == status).count()
    }

    /// Remove and return every discarded patch.
    pub fn take_discarded(&mut self) -> Vec<Patch> {
        let ids: Vec<u32> = self
            .patches
            .iter()
            .filter(|(_, p)| p.is_discarded())
            .map(|(&id, _)| id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.patches.remove(&id))
            .collect()
    }

    /// Split into `(kept, discarded)` patch lists, both in id order.
    pub fn partition(self) -> (Vec<Patch>, Vec<Patch>) {
        self.patches.into_values().partition(|p| !p.is_discarded())
    }
}

impl FromIterator<Patch> for PatchSet {
    /// Later patches with an already used id are dropped.
    fn from_iter<I: IntoIterator<Item = Patch>>(iter: I) -> Self {
        let mut set = Self::new();
        for patch in iter {
            let _ = set.insert(patch);
        }
        set
    }
}
