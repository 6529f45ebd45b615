// ============================================================================
// viewer.rs — flockd
// Viewer pose sources for the analytics sampler: the immersive headset while
// presenting, the desktop camera otherwise.
// ============================================================================

use glam::{Quat, Vec3};

use crate::error::{FlockError, FlockResult};

/// Desktop camera start position.
pub const DEFAULT_CAMERA_POSITION: Vec3 = Vec3::new(0.0, 0.0, 350.0);

/// A tracked rigid pose. Forward is the local `-z` axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(DEFAULT_CAMERA_POSITION, Quat::IDENTITY)
    }
}

/// Where the viewer is and which way they face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewerPose {
    pub position: Vec3,
    pub direction: Vec3,
}

impl From<Pose> for ViewerPose {
    fn from(pose: Pose) -> Self {
        Self {
            position: pose.position,
            direction: pose.forward(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ViewerState {
    pub presenting: bool,
    /// Latest headset pose, if the tracking collaborator has supplied one.
    pub headset: Option<Pose>,
    pub camera: Pose,
}

impl ViewerState {
    pub fn resolve(&self) -> FlockResult<ViewerPose> {
        if self.presenting {
            self.headset
                .map(ViewerPose::from)
                .ok_or_else(|| FlockError::PoseUnavailable(String::from("presenting without a headset pose")))
        } else {
            Ok(self.camera.into())
        }
    }
}
