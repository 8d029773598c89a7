use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

/// A single-threaded container for a boxed system shared between owners.
///
/// The GPU device and queue are created once and then handed to both the
/// buffer registry and the extraction backend through clones of the same
/// `StSystem`, so every allocation and submission goes through one device.
///
/// # Type Parameters
/// - `T`: The type of the contained system, may be unsized
///
/// # Examples
///
/// ```rust
/// use marching_terrain::core::StSystem;
///
/// let system = StSystem::new(Box::new(String::from("queue")));
/// let alias = system.clone();
/// alias.get_mut().push_str("-0");
/// assert_eq!(system.get().as_str(), "queue-0");
/// ```
///
/// # Panics
/// - Panics if a borrow is held while trying to mutably borrow
/// - Panics if a mutable borrow is held while trying to borrow
pub struct StSystem<T: ?Sized> {
    pub system: Rc<RefCell<Box<T>>>,
}

impl<T: ?Sized> StSystem<T> {
    /// Creates a new `StSystem` containing the given boxed system.
    pub fn new(system: Box<T>) -> Self {
        Self {
            system: Rc::new(RefCell::new(system)),
        }
    }

    /// Returns an immutable reference to the contained system.
    ///
    /// # Panics
    /// Panics if the value is currently mutably borrowed.
    pub fn get(&self) -> Ref<'_, Box<T>> {
        self.system.borrow()
    }

    /// Returns a mutable reference to the contained system.
    ///
    /// # Panics
    /// Panics if the value is currently borrowed.
    pub fn get_mut(&self) -> RefMut<'_, Box<T>> {
        self.system.borrow_mut()
    }
}

impl<T: ?Sized> Clone for StSystem<T> {
    fn clone(&self) -> Self {
        Self {
            system: self.system.clone(),
        }
    }
}
