use std::{
    rc::Rc,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// A single-threaded, reference-counted value with interior mutability.
///
/// The buffer registry keeps its per-buffer byte counters in one of these so
/// that writes issued through a shared `&BufferState` can still be recorded.
///
/// # Examples
///
/// ```
/// use marching_terrain::core::StResource;
///
/// let counters = StResource::new(vec![0u64; 3]);
/// let alias = counters.clone();
///
/// alias.get_mut()[1] = 16;
/// assert_eq!(counters.get()[1], 16);
/// ```
///
/// # Panics
/// - Panics if a write guard is requested while any guard is alive on this thread
/// - Panics if the lock was poisoned by an earlier panic
pub struct StResource<T> {
    pub resource: Rc<RwLock<T>>,
}

impl<T> StResource<T> {
    /// Wraps `resource` in a new shared handle.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Rc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read guard over the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap()
    }

    /// Returns a write guard over the contained value.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap()
    }
}

impl<T> Clone for StResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let resource = StResource::new(1u32);
        let alias = resource.clone();
        *alias.get_mut() += 1;
        assert_eq!(*resource.get(), 2);
        assert_eq!(Rc::strong_count(&resource.resource), 2);
    }
}
