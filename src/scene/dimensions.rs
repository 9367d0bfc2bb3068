//! Dimension adapter: reading pose and size from scene objects
//!
//! Scene integration is polymorphic over a closed set of source kinds.
//! Each kind resolves a rigid pose and a bounding extent; kinds that
//! are point-like or range-driven get their extents normalized here so
//! the rest of the pipeline only ever sees half-bounds.

use crossbeam_channel::Sender;

use crate::core::error::Error;
use crate::core::types::{Pose, Result, Vec3};
use crate::scene::object::ObjectId;

/// The closed set of scene sources an effect can be anchored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DimensionKind {
    RigidBody,
    Composite,
    Bone,
    Attachment,
    Beam,
    RangedEmitter,
    RangedSound,
}

/// What changed on an observed scene object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionEvent {
    PoseChanged,
    BoundsChanged,
}

/// Notification delivered from a scene observer.
///
/// Carries only the handle; the registry re-reads current state
/// through the object's source, so observers never hold the record.
#[derive(Clone, Copy, Debug)]
pub struct DimensionChange {
    pub id: ObjectId,
    pub event: DimensionEvent,
}

/// RAII observer registration; disconnects when dropped.
pub struct ObserverGuard(Option<Box<dyn FnOnce()>>);

impl ObserverGuard {
    pub fn new(disconnect: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(disconnect)))
    }

    /// Guard for observers that need no teardown.
    pub fn noop() -> Self {
        Self(None)
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(disconnect) = self.0.take() {
            disconnect();
        }
    }
}

impl std::fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ObserverGuard")
    }
}

/// An external scene object the scheduler can track.
pub trait SceneObject {
    fn kind(&self) -> DimensionKind;

    /// Current world pose, if resolvable.
    fn pose(&self) -> Option<Pose>;

    /// Full extents of the local-space bounding box. Ranged kinds
    /// report their range diameter here.
    fn bounds(&self) -> Option<Vec3>;

    /// Register change observers. Fired notifications land on
    /// `events`, tagged with `id`.
    fn subscribe(&self, id: ObjectId, events: Sender<DimensionChange>) -> Vec<ObserverGuard> {
        let _ = (id, events);
        Vec::new()
    }
}

/// Resolved dimensions for one object.
#[derive(Clone, Copy, Debug)]
pub struct Dimensions {
    pub pose: Pose,
    pub half_bounds: Vec3,
    pub kind: DimensionKind,
}

/// Nominal full extent for point-like sources (bones, attachments).
const POINT_SOURCE_EXTENT: f32 = 0.5;

/// Read pose and bounds from a scene object, normalizing per kind.
pub fn resolve(object: &dyn SceneObject) -> Result<Dimensions> {
    let kind = object.kind();
    let pose = object
        .pose()
        .ok_or_else(|| Error::NotAddable(format!("{kind:?} has no resolvable pose")))?;
    let half_bounds = half_bounds_for(kind, object.bounds())
        .ok_or_else(|| Error::NotAddable(format!("{kind:?} has no resolvable bounds")))?;
    Ok(Dimensions {
        pose,
        half_bounds,
        kind,
    })
}

/// Scene object with a fixed pose and bounds, for props that never
/// move. It registers no observers.
pub struct StaticSceneObject {
    pose: Pose,
    bounds: Vec3,
    kind: DimensionKind,
}

impl StaticSceneObject {
    pub fn new(position: Vec3, full_bounds: Vec3) -> Self {
        Self::with_kind(DimensionKind::RigidBody, Pose::from_position(position), full_bounds)
    }

    pub fn with_kind(kind: DimensionKind, pose: Pose, full_bounds: Vec3) -> Self {
        Self {
            pose,
            bounds: full_bounds,
            kind,
        }
    }
}

impl SceneObject for StaticSceneObject {
    fn kind(&self) -> DimensionKind {
        self.kind
    }

    fn pose(&self) -> Option<Pose> {
        Some(self.pose)
    }

    fn bounds(&self) -> Option<Vec3> {
        Some(self.bounds)
    }
}

/// Per-kind dispatch from raw bounds to half-extents.
pub fn half_bounds_for(kind: DimensionKind, bounds: Option<Vec3>) -> Option<Vec3> {
    match kind {
        DimensionKind::RigidBody | DimensionKind::Composite | DimensionKind::Beam => {
            bounds.map(|b| b.abs() * 0.5)
        }
        // Point sources have no physical extent; give them a nominal one
        DimensionKind::Bone | DimensionKind::Attachment => {
            Some(bounds.unwrap_or(Vec3::splat(POINT_SOURCE_EXTENT)).abs() * 0.5)
        }
        // Range sphere, expressed as a cube of its diameter
        DimensionKind::RangedEmitter | DimensionKind::RangedSound => {
            bounds.map(|b| Vec3::splat(b.abs().max_element() * 0.5))
        }
    }
}
