// tests/live_device.rs
mod common;

use common::ScriptedInput;
use dualarm_collect::{CollectError, HandState, InputKey, InputState, LiveDevice, Result};
use glam::{Quat, Vec3};
use std::cell::RefCell;
use std::rc::Rc;

fn frame(left: HandState, right: HandState) -> InputState {
    InputState { left, right }
}

fn record(log: &Rc<RefCell<Vec<String>>>, entry: String) -> Result<()> {
    log.borrow_mut().push(entry);
    Ok(())
}

#[test]
fn test_transform_is_converted_to_sim_frame() {
    let left = HandState {
        position: [1.0, 2.0, 3.0],
        ..Default::default()
    };
    let mut device = LiveDevice::new(Box::new(ScriptedInput::new(vec![frame(
        left,
        HandState::default(),
    )])));

    let seen: Rc<RefCell<Vec<(Vec3, Quat)>>> = Rc::default();
    let sink = seen.clone();
    device
        .bind_transform_event(
            InputKey::LeftTransform,
            Box::new(move |p, q| {
                sink.borrow_mut().push((p, q));
                Ok(())
            }),
        )
        .unwrap();

    device.update().unwrap();
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Vec3::new(3.0, -1.0, 2.0));
    // Headset identity [1, 0, 0, 0] lands on [0, 0, 1, 0] in (w, x, y, z).
    let q = seen[0].1;
    assert_eq!((q.w, q.x, q.y, q.z), (0.0, 0.0, 1.0, 0.0));
}

#[test]
fn test_quaternion_components_are_permuted() {
    let right = HandState {
        // (w, x, y, z)
        rotation: [0.5, 0.5, 0.5, 0.5],
        ..Default::default()
    };
    let mut device = LiveDevice::new(Box::new(ScriptedInput::new(vec![frame(
        HandState::default(),
        right,
    )])));
    let seen: Rc<RefCell<Option<Quat>>> = Rc::default();
    let sink = seen.clone();
    device
        .bind_transform_event(
            InputKey::RightTransform,
            Box::new(move |_, q| {
                *sink.borrow_mut() = Some(q);
                Ok(())
            }),
        )
        .unwrap();
    device.update().unwrap();

    // [w, x, y, z] -> [z, -y, w, -x]
    let q = seen.borrow().unwrap();
    assert_eq!((q.w, q.x, q.y, q.z), (0.5, -0.5, 0.5, -0.5));
}

#[test]
fn test_scalars_and_buttons_pass_through() {
    let left = HandState {
        trigger: 0.75,
        primary: true,
        secondary: false,
        grip: true,
        joystick: [0.25, -0.5],
        ..Default::default()
    };
    let right = HandState {
        trigger: 0.1,
        secondary: true,
        ..Default::default()
    };
    let mut device = LiveDevice::new(Box::new(ScriptedInput::new(vec![frame(left, right)])));

    let log: Rc<RefCell<Vec<String>>> = Rc::default();
    let l = log.clone();
    device
        .bind_trigger_event(
            InputKey::LeftTrigger,
            Box::new(move |v| record(&l, format!("lt {v}"))),
        )
        .unwrap();
    let l = log.clone();
    device
        .bind_trigger_event(
            InputKey::RightTrigger,
            Box::new(move |v| record(&l, format!("rt {v}"))),
        )
        .unwrap();
    let l = log.clone();
    device
        .bind_primary_button_event(InputKey::X, Box::new(move |b| record(&l, format!("x {b}"))))
        .unwrap();
    let l = log.clone();
    device
        .bind_secondary_button_event(InputKey::B, Box::new(move |b| record(&l, format!("b {b}"))))
        .unwrap();
    let l = log.clone();
    device
        .bind_grip_button_event(
            InputKey::LeftGrip,
            Box::new(move |b| record(&l, format!("lg {b}"))),
        )
        .unwrap();
    let l = log.clone();
    device
        .bind_joystick_position_event(
            InputKey::LeftJoystick,
            Box::new(move |x, y| record(&l, format!("ls {x} {y}"))),
        )
        .unwrap();

    device.update().unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["lt 0.75", "rt 0.1", "x true", "b true", "lg true", "ls 0.25 -0.5"]
    );
    assert_eq!(device.keys().len(), 6);
}

#[test]
fn test_wrong_key_kind_is_rejected() {
    let mut device = LiveDevice::new(Box::new(ScriptedInput::new(vec![])));
    let err = device
        .bind_trigger_event(InputKey::A, Box::new(|_| Ok(())))
        .unwrap_err();
    assert!(matches!(err, CollectError::UnboundKey { event: "trigger", .. }));

    assert!(device.bind_transform_event(InputKey::LeftGrip, Box::new(|_, _| Ok(()))).is_err());
    assert!(device.bind_primary_button_event(InputKey::Y, Box::new(|_| Ok(()))).is_err());
    assert!(device.bind_secondary_button_event(InputKey::X, Box::new(|_| Ok(()))).is_err());
    assert!(device.bind_grip_button_event(InputKey::LeftTrigger, Box::new(|_| Ok(()))).is_err());
    assert!(device.bind_joystick_position_event(InputKey::B, Box::new(|_, _| Ok(()))).is_err());
    assert!(device.keys().is_empty());
}

#[test]
fn test_no_input_dispatches_nothing() {
    let mut device = LiveDevice::new(Box::new(ScriptedInput::new(vec![])));
    let calls = Rc::new(RefCell::new(0));
    let c = calls.clone();
    device
        .bind_trigger_event(InputKey::LeftTrigger, Box::new(move |_| {
            *c.borrow_mut() += 1;
            Ok(())
        }))
        .unwrap();
    device.update().unwrap();
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn test_setter_error_aborts_update() {
    let left = HandState {
        trigger: f32::NAN,
        primary: true,
        ..Default::default()
    };
    let mut device = LiveDevice::new(Box::new(ScriptedInput::new(vec![frame(
        left,
        HandState::default(),
    )])));
    device
        .bind_trigger_event(
            InputKey::LeftTrigger,
            Box::new(|v| {
                if v.is_finite() {
                    Ok(())
                } else {
                    Err(CollectError::Collaborator(format!("trigger reading {v}")))
                }
            }),
        )
        .unwrap();
    let later = Rc::new(RefCell::new(0));
    let c = later.clone();
    device
        .bind_primary_button_event(
            InputKey::X,
            Box::new(move |_| {
                *c.borrow_mut() += 1;
                Ok(())
            }),
        )
        .unwrap();

    let err = device.update().unwrap_err();
    assert!(matches!(err, CollectError::Collaborator(_)));
    // Bindings after the failing one are not reached.
    assert_eq!(*later.borrow(), 0);
}

#[test]
fn test_held_grip_is_delivered_every_tick() {
    let held = HandState {
        grip: true,
        ..Default::default()
    };
    let frames = vec![
        frame(held, HandState::default()),
        frame(held, HandState::default()),
        frame(held, HandState::default()),
        frame(HandState::default(), HandState::default()),
    ];
    let mut device = LiveDevice::new(Box::new(ScriptedInput::new(frames)));
    let levels: Rc<RefCell<Vec<bool>>> = Rc::default();
    let sink = levels.clone();
    device
        .bind_grip_button_event(
            InputKey::LeftGrip,
            Box::new(move |pressed| {
                sink.borrow_mut().push(pressed);
                Ok(())
            }),
        )
        .unwrap();

    for _ in 0..4 {
        device.update().unwrap();
    }
    // Levels, not edges: every tick of a held button reports `true`.
    assert_eq!(*levels.borrow(), vec![true, true, true, false]);
}
