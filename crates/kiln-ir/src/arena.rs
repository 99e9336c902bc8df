//! Arena storage with typed handles.
//!
//! Every IR entity (types, variables, instructions, blocks, control-flow
//! nodes) lives in an arena owned by its [`Module`](crate::Module) or
//! [`Function`](crate::Function) and is referred to by a [`Handle`]. Handle
//! equality is index equality, so "is this the same block" never depends on
//! pointer identity.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into an [`Arena`] or [`UniqueArena`].
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)
    }
}

impl<T> Handle<T> {
    /// Creates a handle from a zero-based index.
    ///
    /// Handles built this way are only meaningful against the arena they were
    /// counted for; lookups with a stale index fail in [`Arena::try_get`].
    pub fn from_index(index: u32) -> Self {
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based index of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

fn checked_index(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("arena overflow: {len} items exceeds u32::MAX"))
}

/// An append-only arena.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the handle the next appended value will receive.
    pub fn next_handle(&self) -> Handle<T> {
        Handle::from_index(checked_index(self.data.len()))
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let handle = self.next_handle();
        self.data.push(value);
        handle
    }

    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.data.get_mut(handle.index())
    }

    /// Returns `true` if `handle` refers to a value in this arena.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        handle.index() < self.data.len()
    }

    /// Iterates over `(handle, &value)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_index(i as u32), v))
    }

    /// Iterates over `(handle, &mut value)` pairs in allocation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (Handle::from_index(i as u32), v))
    }

    /// Iterates over every handle in allocation order.
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + use<T> {
        (0..checked_index(self.data.len())).map(Handle::from_index)
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.data[handle.index()]
    }
}

/// A deduplicating arena: inserting a value equal to an existing one returns
/// the existing handle. Types live here so that structural type equality is
/// handle equality.
#[derive(Clone, Debug)]
pub struct UniqueArena<T> {
    data: Vec<T>,
    map: HashMap<T, u32>,
}

impl<T: Hash + Eq> Default for UniqueArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> UniqueArena<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Inserts a value, returning the existing handle if an equal value is
    /// already present.
    pub fn insert(&mut self, value: T) -> Handle<T>
    where
        T: Clone,
    {
        if let Some(&index) = self.map.get(&value) {
            return Handle::from_index(index);
        }
        let index = checked_index(self.data.len());
        self.map.insert(value.clone(), index);
        self.data.push(value);
        Handle::from_index(index)
    }

    /// Looks up the handle of a value without inserting it.
    pub fn get(&self, value: &T) -> Option<Handle<T>> {
        self.map.get(value).map(|&index| Handle::from_index(index))
    }

    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_index(i as u32), v))
    }
}

impl<T> Index<Handle<T>> for UniqueArena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_index() {
        let mut arena = Arena::new();
        let a = arena.append("load");
        let b = arena.append("store");
        assert_eq!(arena[a], "load");
        assert_eq!(arena[b], "store");
        assert_eq!(arena.len(), 2);
        assert!(arena.contains(b));
        assert!(!arena.contains(Handle::from_index(2)));
    }

    #[test]
    fn next_handle_matches_append() {
        let mut arena = Arena::<u32>::new();
        let predicted = arena.next_handle();
        let actual = arena.append(7);
        assert_eq!(predicted, actual);
        assert_eq!(arena.next_handle().index(), 1);
    }

    #[test]
    fn handles_follow_allocation_order() {
        let mut arena = Arena::new();
        arena.append('a');
        arena.append('b');
        arena.append('c');
        let indices: Vec<_> = arena.handles().map(Handle::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let pairs: Vec<_> = arena.iter().map(|(h, &c)| (h.index(), c)).collect();
        assert_eq!(pairs, vec![(0, 'a'), (1, 'b'), (2, 'c')]);
    }

    #[test]
    fn unique_arena_dedups_equal_values() {
        let mut arena = UniqueArena::new();
        let a = arena.insert("vec4<f32>");
        let b = arena.insert("f32");
        let c = arena.insert("vec4<f32>");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(&"f32"), Some(b));
        assert_eq!(arena.get(&"bool"), None);
    }

    #[test]
    fn try_get_rejects_stale_handles() {
        let mut arena = Arena::new();
        let h = arena.append(42);
        assert_eq!(arena.try_get(h), Some(&42));
        assert_eq!(arena.try_get(Handle::from_index(9)), None);
    }

    #[test]
    fn handle_ordering_is_index_ordering() {
        let first: Handle<u8> = Handle::from_index(0);
        let second: Handle<u8> = Handle::from_index(1);
        assert!(first < second);
        assert_eq!(format!("{second:?}"), "[1]");
    }
}
