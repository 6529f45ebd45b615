// ============================================================================
// interaction.rs — flockd
// Two grab-toggle state machines and the mapping from their state to the
// two predator targets fed to the velocity kernel.
// ============================================================================

use glam::Vec3;

use crate::config::PARKED_PREDATOR;
use crate::error::{FlockError, FlockResult};
use crate::viewer::Pose;

/// Distance along the controller's forward axis at which its cursor sits.
pub const CURSOR_REACH: f32 = 300.0;
/// Squared viewer distance below which the cursor collapses onto the
/// controller itself.
pub const CURSOR_COLLAPSE_DIST_SQ: f32 = 0.2;

/// Controller driving the right-hand toggle.
pub const RIGHT_CONTROLLER: u32 = 0;
/// Controller driving the left-hand toggle.
pub const LEFT_CONTROLLER: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrabEvent {
    GrabStart,
    GrabEnd,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Idle,
    Active,
}

/// Indicator visibility change for the rendering collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndicatorChange {
    pub controller: u32,
    pub visible: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct Controller {
    state: ControllerState,
    /// Live world position of the controller's cursor.
    position: Vec3,
}

#[derive(Clone, Debug, Default)]
pub struct InteractionController {
    controllers: [Controller; 2],
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: u32) -> FlockResult<usize> {
        match id {
            0 | 1 => Ok(id as usize),
            _ => Err(FlockError::invalid(format!("controller id {id} (expected 0 or 1)"))),
        }
    }

    /// Feed a grab event. Returns the indicator change when the event
    /// caused a transition, `None` when it was ignored.
    pub fn handle_event(&mut self, id: u32, event: GrabEvent) -> FlockResult<Option<IndicatorChange>> {
        let slot = self.slot(id)?;
        let controller = &mut self.controllers[slot];
        let next = match (controller.state, event) {
            (ControllerState::Idle, GrabEvent::GrabStart) => ControllerState::Active,
            (ControllerState::Active, GrabEvent::GrabEnd) => ControllerState::Idle,
            (state, event) => {
                log::debug!("Controller {id}: ignoring {event:?} while {state:?}");
                return Ok(None);
            }
        };
        controller.state = next;
        Ok(Some(IndicatorChange {
            controller: id,
            visible: next == ControllerState::Active,
        }))
    }

    pub fn set_world_position(&mut self, id: u32, position: Vec3) -> FlockResult<()> {
        let slot = self.slot(id)?;
        self.controllers[slot].position = position;
        Ok(())
    }

    pub fn state(&self, id: u32) -> FlockResult<ControllerState> {
        Ok(self.controllers[self.slot(id)?].state)
    }

    pub fn indicator_visible(&self, id: u32) -> FlockResult<bool> {
        Ok(self.state(id)? == ControllerState::Active)
    }

    /// Predator targets for this frame.
    pub fn resolve_predators(&self) -> [Vec3; 2] {
        let right = &self.controllers[RIGHT_CONTROLLER as usize];
        let left = &self.controllers[LEFT_CONTROLLER as usize];
        resolve_predators(
            left.state == ControllerState::Active,
            right.state == ControllerState::Active,
            left.position,
            right.position,
        )
    }
}

/// A single active controller drives both predators; only when both are
/// active do they split.
pub fn resolve_predators(left_active: bool, right_active: bool, left: Vec3, right: Vec3) -> [Vec3; 2] {
    match (left_active, right_active) {
        (false, false) => [PARKED_PREDATOR, PARKED_PREDATOR],
        (false, true) => [right, right],
        (true, false) => [left, left],
        (true, true) => [left, right],
    }
}

/// World position of a controller's cursor given the controller pose and
/// the viewer position.
pub fn cursor_from_pose(controller: &Pose, viewer_position: Vec3) -> Vec3 {
    if viewer_position.distance_squared(controller.position) < CURSOR_COLLAPSE_DIST_SQ {
        controller.position
    } else {
        controller.position + controller.forward() * CURSOR_REACH
    }
}
