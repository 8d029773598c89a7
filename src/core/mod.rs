//! # Core Module
//!
//! Single-threaded shared handles used to pass GPU objects and bookkeeping
//! between the subsystems that own a frame. The whole pipeline runs on one
//! thread of control per frame, so these wrap `Rc` rather than `Arc`.
//!
//! ## Key Components
//! - `StResource`: Reference-counted value with read/write guards
//! - `StSystem`: Reference-counted boxed system (device, queue, buffer registry)
//!
//! ## Usage
//! ```rust
//! use marching_terrain::core::{StResource, StSystem};
//!
//! let written = StResource::new(0u64);
//! *written.get_mut() += 48;
//! assert_eq!(*written.get(), 48);
//!
//! let system = StSystem::new(Box::new(vec![1u32, 2, 3]));
//! let shared = system.clone();
//! shared.get_mut().push(4);
//! assert_eq!(system.get().len(), 4);
//! ```

pub mod st_resource;
pub mod st_system;

pub use st_resource::StResource;
pub use st_system::StSystem;
