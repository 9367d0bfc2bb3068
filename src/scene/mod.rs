//! Scene-facing object tracking: dimension adapter and registry

pub mod dimensions;
pub mod object;
pub mod registry;

pub use dimensions::{
    DimensionChange, DimensionEvent, DimensionKind, ObserverGuard, SceneObject, StaticSceneObject,
};
pub use object::{ObjectId, ObjectRecord};
pub use registry::ObjectRegistry;
