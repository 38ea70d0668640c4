//! Engine data structures: tile state, ribbon geometry, textures and materials.
//!
//! - `tile_state` is the GPU-free animation state of a tile set (layer cycling and flow)
//! - `path` prepares raw input points for the ribbon builder
//! - `ribbon_mesh` holds the CPU-side ribbon geometry and its wave deformation
//! - `texture` contains the GPU array texture wrapper
//! - `material` binds array textures and the shared animation uniform for drawing

pub mod material;
pub mod path;
pub mod ribbon_mesh;
pub mod texture;
pub mod tile_state;
