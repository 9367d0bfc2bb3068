//! Sparse voxel grid over registered objects

pub mod grid;

pub use grid::VoxelGrid;
