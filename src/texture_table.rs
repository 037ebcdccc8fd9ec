//! Shared texture handles and the terrain's texture table.
//!
//! Cells store indices into the table. Handles are reference counted and
//! compared by identity, so the same texture registered twice resolves to
//! the same slot.

use std::fmt;
use std::sync::Arc;

use crate::error::{TerrainError, TerrainResult};

/// Renderer-side description of a texture. `name` is the resource path used
/// to persist references.
#[derive(Debug, PartialEq, Eq)]
pub struct TextureInfo {
    pub name: String,
}

/// Shared texture reference. Cloning bumps the reference count.
#[derive(Clone)]
pub struct TextureHandle(Arc<TextureInfo>);

impl TextureHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(TextureInfo { name: name.into() }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Identity comparison: true only for clones of the same handle.
    pub fn same(&self, other: &TextureHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live clones of this handle.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextureHandle").field(&self.0.name).finish()
    }
}

impl PartialEq for TextureHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

/// Ordered texture slots referenced by cell indices.
#[derive(Clone, Debug, Default)]
pub struct TextureTable {
    slots: Vec<TextureHandle>,
    /// Slot limit imposed by the renderer
    capacity: Option<usize>,
}

impl TextureTable {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index_of(&self, texture: &TextureHandle) -> Option<i32> {
        self.slots
            .iter()
            .position(|slot| slot.same(texture))
            .map(|i| i as i32)
    }

    /// Index of `texture`, registering it when absent.
    pub fn find_or_add(&mut self, texture: &TextureHandle) -> TerrainResult<i32> {
        if let Some(index) = self.index_of(texture) {
            return Ok(index);
        }
        if let Some(capacity) = self.capacity {
            if self.slots.len() >= capacity {
                return Err(TerrainError::TextureLimit { capacity });
            }
        }
        self.slots.push(texture.clone());
        Ok(self.slots.len() as i32 - 1)
    }

    pub fn get(&self, index: i32) -> Option<&TextureHandle> {
        usize::try_from(index).ok().and_then(|i| self.slots.get(i))
    }

    /// Swap the texture in slot `index`, returning the previous one.
    pub fn replace(&mut self, index: i32, texture: TextureHandle) -> Option<TextureHandle> {
        let slot = usize::try_from(index).ok().and_then(|i| self.slots.get_mut(i))?;
        Some(std::mem::replace(slot, texture))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextureHandle> {
        self.slots.iter()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_or_add_is_idempotent() {
        let mut table = TextureTable::default();
        let grass = TextureHandle::new("res://grass.png");
        let rock = TextureHandle::new("res://rock.png");

        assert_eq!(table.find_or_add(&grass).unwrap(), 0);
        assert_eq!(table.find_or_add(&rock).unwrap(), 1);
        assert_eq!(table.find_or_add(&grass.clone()).unwrap(), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_identity_not_name() {
        let mut table = TextureTable::default();
        let a = TextureHandle::new("same.png");
        let b = TextureHandle::new("same.png");
        table.find_or_add(&a).unwrap();
        assert_eq!(table.index_of(&b), None);
        assert!(a != b);
    }

    #[test]
    fn test_capacity_is_reported() {
        let mut table = TextureTable::new(Some(1));
        table.find_or_add(&TextureHandle::new("a")).unwrap();
        let err = table.find_or_add(&TextureHandle::new("b")).unwrap_err();
        assert!(matches!(err, TerrainError::TextureLimit { capacity: 1 }));
    }

    #[test]
    fn test_table_holds_and_releases_references() {
        let mut table = TextureTable::default();
        let sand = TextureHandle::new("sand");
        assert_eq!(sand.ref_count(), 1);

        table.find_or_add(&sand).unwrap();
        assert_eq!(sand.ref_count(), 2);

        let previous = table.replace(0, TextureHandle::new("snow")).unwrap();
        assert!(previous.same(&sand));
        drop(previous);
        assert_eq!(sand.ref_count(), 1);

        assert!(table.replace(5, sand.clone()).is_none());
        assert!(table.get(-1).is_none());
    }
}
