use core::any::Any;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;

use crate::UseAfterReleaseError;

/// A typed identifier for a resource owned by a [`ResourceTable`].
///
/// Handles are plain integers plus a compile-time type tag; they carry no
/// ownership themselves. The entry a handle refers to lives in the table
/// until released, and a handle used after its entry was released fails with
/// [`UseAfterReleaseError`] rather than touching freed state.
pub struct Handle<T> {
    id: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(id: u32) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The raw table identifier. Zero is never a valid handle.
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.id)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Arena of owned resources addressed by [`Handle`]s.
///
/// Identifiers start at 1 so that 0 can keep its traditional role as a
/// never-valid sentinel. Released slots are pushed onto a free list and
/// recycled by later insertions.
#[derive(Default)]
pub(crate) struct ResourceTable {
    entries: Vec<Entry>,
    free_head: Option<usize>,
}

enum Entry {
    Free { next: Option<usize> },
    Occupied { resource: Box<dyn Any + Send> },
}

impl ResourceTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert `resource`, returning a fresh handle for it.
    pub(crate) fn push<T: Any + Send>(&mut self, resource: T) -> Handle<T> {
        let resource = Box::new(resource);
        let index = match self.free_head.take() {
            Some(index) => {
                let Entry::Free { next } = self.entries[index] else {
                    unreachable!("free list points at an occupied entry");
                };
                self.free_head = next;
                self.entries[index] = Entry::Occupied { resource };
                index
            }
            None => {
                self.entries.push(Entry::Occupied { resource });
                self.entries.len() - 1
            }
        };
        Handle::new(index as u32 + 1)
    }

    pub(crate) fn get<T: Any + Send>(&self, handle: Handle<T>) -> Result<&T, UseAfterReleaseError> {
        let stale = UseAfterReleaseError { handle: handle.id };
        let index = index_of(handle.id).ok_or(stale)?;
        match self.entries.get(index) {
            Some(Entry::Occupied { resource }) => resource.downcast_ref().ok_or(stale),
            _ => Err(stale),
        }
    }

    pub(crate) fn get_mut<T: Any + Send>(
        &mut self,
        handle: Handle<T>,
    ) -> Result<&mut T, UseAfterReleaseError> {
        let stale = UseAfterReleaseError { handle: handle.id };
        let index = index_of(handle.id).ok_or(stale)?;
        match self.entries.get_mut(index) {
            Some(Entry::Occupied { resource }) => resource.downcast_mut().ok_or(stale),
            _ => Err(stale),
        }
    }

    /// Remove the entry for `handle` and return the resource it owned.
    ///
    /// The slot is recycled for later insertions. Deleting a handle twice, or
    /// a handle whose slot was recycled for a different type, fails with
    /// [`UseAfterReleaseError`] and leaves the table untouched.
    pub(crate) fn delete<T: Any + Send>(
        &mut self,
        handle: Handle<T>,
    ) -> Result<T, UseAfterReleaseError> {
        let stale = UseAfterReleaseError { handle: handle.id };
        let index = index_of(handle.id).ok_or(stale)?;
        match self.entries.get(index) {
            Some(Entry::Occupied { resource }) if resource.is::<T>() => {}
            _ => return Err(stale),
        }
        let entry = mem::replace(
            &mut self.entries[index],
            Entry::Free {
                next: self.free_head,
            },
        );
        self.free_head = Some(index);
        let Entry::Occupied { resource } = entry else {
            unreachable!("entry occupancy checked above");
        };
        match resource.downcast() {
            Ok(resource) => Ok(*resource),
            Err(_) => unreachable!("entry type checked above"),
        }
    }

    /// Number of live entries.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Occupied { .. }))
            .count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn index_of(id: u32) -> Option<usize> {
    id.checked_sub(1).map(|i| i as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_get_delete() {
        let mut table = ResourceTable::new();
        let a = table.push(41_u64);
        let b = table.push("resource".to_string());
        assert_eq!(*table.get(a).unwrap(), 41);
        assert_eq!(table.get(b).unwrap(), "resource");
        *table.get_mut(a).unwrap() += 1;
        assert_eq!(table.delete(a).unwrap(), 42);
        assert_eq!(table.delete(b).unwrap(), "resource");
        assert!(table.is_empty());
    }

    #[test]
    fn ids_start_at_one() {
        let mut table = ResourceTable::new();
        let h = table.push(());
        assert_eq!(h.id(), 1);
    }

    #[test]
    fn double_delete_is_reported() {
        let mut table = ResourceTable::new();
        let h = table.push(7_u32);
        table.delete(h).unwrap();
        let err = table.delete(h).unwrap_err();
        assert_eq!(err.handle, h.id());
    }

    #[test]
    fn slots_are_recycled() {
        let mut table = ResourceTable::new();
        let a = table.push(1_u32);
        table.delete(a).unwrap();
        let b = table.push(2_u32);
        assert_eq!(a.id(), b.id());
        assert_eq!(*table.get(b).unwrap(), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn recycled_slot_rejects_stale_typed_handle() {
        let mut table = ResourceTable::new();
        let a = table.push(1_u32);
        table.delete(a).unwrap();
        let b = table.push("other".to_string());
        assert_eq!(a.id(), b.id());
        // The old u32 handle aliases the slot but not the type.
        assert!(table.get(a).is_err());
        assert!(table.delete(a).is_err());
        assert_eq!(table.get(b).unwrap(), "other");
    }
}
