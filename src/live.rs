//! Live teleoperation device.
//!
//! A [`LiveDevice`] polls an [`InputSource`] (a VR headset with two hand controllers)
//! once per tick and fans the sampled state out to the setters bound with the
//! `bind_*_event` methods. Pose events are converted from the headset convention into the
//! simulation convention before dispatch; trigger, button and joystick values are passed
//! through untouched.

use crate::error::{CollectError, Result};
use crate::frames::{input_position_to_sim, input_quat_to_sim, quat_from_wxyz};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{Span, debug, info_span, trace};

/// Sampled state of one hand controller, in headset convention.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandState {
    pub position: [f32; 3],
    /// `(w, x, y, z)`.
    pub rotation: [f32; 4],
    pub trigger: f32,
    pub primary: bool,
    pub secondary: bool,
    pub grip: bool,
    pub joystick: [f32; 2],
}

impl Default for HandState {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
            trigger: 0.0,
            primary: false,
            secondary: false,
            grip: false,
            joystick: [0.0; 2],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub left: HandState,
    pub right: HandState,
}

/// Physical or virtual teleoperation input.
pub trait InputSource {
    /// Latest input state; `Ok(None)` when nothing has been received yet.
    fn poll(&mut self) -> Result<Option<InputState>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputKey {
    LeftTransform,
    RightTransform,
    LeftTrigger,
    RightTrigger,
    /// Left primary button.
    X,
    /// Left secondary button.
    Y,
    /// Right primary button.
    A,
    /// Right secondary button.
    B,
    LeftGrip,
    RightGrip,
    LeftJoystick,
    RightJoystick,
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl InputKey {
    fn hand<'a>(&self, state: &'a InputState) -> &'a HandState {
        match self {
            InputKey::LeftTransform
            | InputKey::LeftTrigger
            | InputKey::X
            | InputKey::Y
            | InputKey::LeftGrip
            | InputKey::LeftJoystick => &state.left,
            InputKey::RightTransform
            | InputKey::RightTrigger
            | InputKey::A
            | InputKey::B
            | InputKey::RightGrip
            | InputKey::RightJoystick => &state.right,
        }
    }
}

/// Setters report failures like dataset setters do; the first error aborts the update.
pub type PoseSetter = Box<dyn FnMut(Vec3, Quat) -> Result<()>>;
pub type ScalarSetter = Box<dyn FnMut(f32) -> Result<()>>;
pub type ButtonSetter = Box<dyn FnMut(bool) -> Result<()>>;
pub type AxisSetter = Box<dyn FnMut(f32, f32) -> Result<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Button {
    Primary,
    Secondary,
    Grip,
}

enum LiveHandler {
    Transform(PoseSetter),
    Trigger(ScalarSetter),
    Button(Button, ButtonSetter),
    Joystick(AxisSetter),
}

impl LiveHandler {
    fn dispatch(&mut self, hand: &HandState) -> Result<()> {
        match self {
            LiveHandler::Transform(setter) => {
                let position = input_position_to_sim(hand.position);
                let rotation = quat_from_wxyz(input_quat_to_sim(hand.rotation));
                setter(position, rotation)
            }
            LiveHandler::Trigger(setter) => setter(hand.trigger),
            LiveHandler::Button(button, setter) => setter(match button {
                Button::Primary => hand.primary,
                Button::Secondary => hand.secondary,
                Button::Grip => hand.grip,
            }),
            LiveHandler::Joystick(setter) => setter(hand.joystick[0], hand.joystick[1]),
        }
    }
}

/// Teleoperation device with an explicit subscription table.
pub struct LiveDevice {
    source: Box<dyn InputSource>,
    bindings: Vec<(InputKey, LiveHandler)>,
    span: Span,
}

impl LiveDevice {
    pub fn new(source: Box<dyn InputSource>) -> Self {
        Self {
            source,
            bindings: Vec::new(),
            span: info_span!("live_device"),
        }
    }

    /// Keys with at least one binding, in registration order.
    pub fn keys(&self) -> Vec<InputKey> {
        let mut keys = Vec::new();
        for (key, _) in &self.bindings {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
        keys
    }

    fn bind(&mut self, key: InputKey, handler: LiveHandler) {
        debug!(parent: &self.span, %key, "bound input event");
        self.bindings.push((key, handler));
    }

    fn expect_key(key: InputKey, allowed: [InputKey; 2], event: &'static str) -> Result<()> {
        if allowed.contains(&key) {
            Ok(())
        } else {
            Err(CollectError::UnboundKey {
                key: key.to_string(),
                event,
            })
        }
    }

    /// Binds a hand pose, delivered in simulation convention.
    pub fn bind_transform_event(&mut self, key: InputKey, setter: PoseSetter) -> Result<()> {
        Self::expect_key(
            key,
            [InputKey::LeftTransform, InputKey::RightTransform],
            "transform",
        )?;
        self.bind(key, LiveHandler::Transform(setter));
        Ok(())
    }

    pub fn bind_trigger_event(&mut self, key: InputKey, setter: ScalarSetter) -> Result<()> {
        Self::expect_key(key, [InputKey::LeftTrigger, InputKey::RightTrigger], "trigger")?;
        self.bind(key, LiveHandler::Trigger(setter));
        Ok(())
    }

    pub fn bind_primary_button_event(&mut self, key: InputKey, setter: ButtonSetter) -> Result<()> {
        Self::expect_key(key, [InputKey::X, InputKey::A], "primary button")?;
        self.bind(key, LiveHandler::Button(Button::Primary, setter));
        Ok(())
    }

    pub fn bind_secondary_button_event(
        &mut self,
        key: InputKey,
        setter: ButtonSetter,
    ) -> Result<()> {
        Self::expect_key(key, [InputKey::Y, InputKey::B], "secondary button")?;
        self.bind(key, LiveHandler::Button(Button::Secondary, setter));
        Ok(())
    }

    pub fn bind_grip_button_event(&mut self, key: InputKey, setter: ButtonSetter) -> Result<()> {
        Self::expect_key(key, [InputKey::LeftGrip, InputKey::RightGrip], "grip button")?;
        self.bind(key, LiveHandler::Button(Button::Grip, setter));
        Ok(())
    }

    pub fn bind_joystick_position_event(
        &mut self,
        key: InputKey,
        setter: AxisSetter,
    ) -> Result<()> {
        Self::expect_key(
            key,
            [InputKey::LeftJoystick, InputKey::RightJoystick],
            "joystick",
        )?;
        self.bind(key, LiveHandler::Joystick(setter));
        Ok(())
    }

    /// Polls the source and dispatches every binding in registration order.
    pub fn update(&mut self) -> Result<()> {
        let _enter = self.span.enter();
        let Some(state) = self.source.poll()? else {
            trace!("no input received yet");
            return Ok(());
        };
        for (key, handler) in &mut self.bindings {
            handler.dispatch(key.hand(&state))?;
        }
        Ok(())
    }
}
