//! # Application State
//!
//! Everything that reaches the engine from outside a frame:
//! - Construction-time configuration
//! - Pointer input and the per-frame sculpt request
//! - The headless GPU context used for extraction

pub mod config;
pub mod graphics_resources_builder;
pub mod input_manager;
pub mod input_state;

pub use config::{BackendPreference, NormalMode, TerrainConfig};
pub use graphics_resources_builder::{Graphics, GraphicsBuilder};
pub use input_manager::InputManager;
pub use input_state::{BrushMode, ProcessedInputState, RawInputState, SculptInput};
