//! Wiring of controllers to devices.
//!
//! Each `add_*` function builds one controller from configuration, binds its setters on
//! the given device and registers it with the manager. Devices are wired while still
//! owned by the caller and handed to the manager afterwards.

use crate::arm::ArmController;
use crate::augment::build_interpolator;
use crate::config::{ArmConfig, CollectionConfig, GripperConfig, Side};
use crate::controller::{ActuatorMapping, Shared, shared};
use crate::dataset::{EFFECTOR_MOTOR, END_ORIENTATION, END_POSITION};
use crate::env::PoseTracker;
use crate::error::{CollectError, Result};
use crate::gripper::{GripperController, GripperMode};
use crate::live::{InputKey, LiveDevice};
use crate::manager::CollectionManager;
use crate::replay::ReplayDevice;
use crate::task_status::TaskStatusController;
use std::ops::Range;
use std::rc::Rc;

/// Flat slice of one arm's `(x, y, z)` in a dual-arm position sample.
pub fn position_slice(side: Side) -> Range<usize> {
    let start = side.index() * 3;
    start..start + 3
}

/// Flat slice of one arm's `(x, y, z, w)` in a dual-arm orientation sample.
pub fn orientation_slice(side: Side) -> Range<usize> {
    let start = side.index() * 4;
    start..start + 4
}

/// Flat slice of one gripper's commands in a dual-gripper motor sample.
pub fn motor_slice(side: Side, actuators: usize) -> Range<usize> {
    let start = side.index() * actuators;
    start..start + actuators
}

pub fn transform_key(side: Side) -> InputKey {
    match side {
        Side::Left => InputKey::LeftTransform,
        Side::Right => InputKey::RightTransform,
    }
}

/// Trigger, primary and secondary keys of one hand.
pub fn gripper_keys(side: Side) -> [InputKey; 3] {
    match side {
        Side::Left => [InputKey::LeftTrigger, InputKey::X, InputKey::Y],
        Side::Right => [InputKey::RightTrigger, InputKey::A, InputKey::B],
    }
}

fn create_arm_controller(
    manager: &CollectionManager,
    arm: &ArmConfig,
    base_body: &str,
    tracker: Box<dyn PoseTracker>,
) -> Result<Shared<ArmController>> {
    if tracker.eef_site() != arm.ee_site {
        return Err(CollectError::config(format!(
            "arm '{}' tracks site '{}' but its solver tracks '{}'",
            arm.name,
            arm.ee_site,
            tracker.eef_site()
        )));
    }
    if tracker.joint_names() != arm.joint_names.as_slice() {
        return Err(CollectError::config(format!(
            "arm '{}' joint list does not match its solver",
            arm.name
        )));
    }
    let mapping = ActuatorMapping::from_lists(&arm.motor_names, &arm.motor_init)?;
    let controller = ArmController::new(&arm.name, manager.env(), mapping, base_body, tracker)?;
    Ok(shared(controller))
}

/// Arm following a hand controller's pose.
pub fn add_arm_live_controller(
    manager: &mut CollectionManager,
    device: &mut LiveDevice,
    arm: &ArmConfig,
    base_body: &str,
    tracker: Box<dyn PoseTracker>,
) -> Result<Shared<ArmController>> {
    let controller = create_arm_controller(manager, arm, base_body, tracker)?;
    let target = Rc::clone(&controller);
    device.bind_transform_event(
        transform_key(arm.side),
        Box::new(move |position, rotation| {
            target.borrow_mut().update_goal(position, rotation);
            Ok(())
        }),
    )?;
    manager.add_controller(controller.clone());
    Ok(controller)
}

/// Arm following recorded base-frame end-effector poses.
pub fn add_arm_replay_controller(
    manager: &mut CollectionManager,
    device: &mut ReplayDevice,
    arm: &ArmConfig,
    base_body: &str,
    tracker: Box<dyn PoseTracker>,
) -> Result<Shared<ArmController>> {
    let controller = create_arm_controller(manager, arm, base_body, tracker)?;

    let target = Rc::clone(&controller);
    device.bind_dataset_event(
        END_POSITION,
        position_slice(arm.side),
        Box::new(move |sample| target.borrow_mut().update_action_position(sample)),
    )?;
    let target = Rc::clone(&controller);
    device.bind_dataset_event(
        END_ORIENTATION,
        orientation_slice(arm.side),
        Box::new(move |sample| target.borrow_mut().update_action_axisangle(sample)),
    )?;

    manager.add_controller(controller.clone());
    Ok(controller)
}

fn create_gripper_controller(
    gripper: &GripperConfig,
    mode: GripperMode,
) -> Result<Shared<GripperController>> {
    let mapping = ActuatorMapping::from_lists(&gripper.actuator_names, &gripper.init_ctrl)?;
    let controller = GripperController::new(&gripper.name, mapping, gripper.ranges(), mode)?;
    Ok(shared(controller))
}

/// Trigger-driven gripper.
///
/// Each key is routed by kind: primary buttons unlock, secondary buttons lock and
/// triggers drive the closing command. Any other key is rejected.
pub fn add_gripper_live_controller(
    manager: &mut CollectionManager,
    device: &mut LiveDevice,
    gripper: &GripperConfig,
    keys: &[InputKey],
) -> Result<Shared<GripperController>> {
    let controller = create_gripper_controller(gripper, GripperMode::Live)?;

    for &key in keys {
        let target = Rc::clone(&controller);
        match key {
            InputKey::X | InputKey::A => device.bind_primary_button_event(
                key,
                Box::new(move |pressed| {
                    target.borrow_mut().update_primary_button(pressed);
                    Ok(())
                }),
            )?,
            InputKey::Y | InputKey::B => device.bind_secondary_button_event(
                key,
                Box::new(move |pressed| {
                    target.borrow_mut().update_secondary_button(pressed);
                    Ok(())
                }),
            )?,
            InputKey::LeftTrigger | InputKey::RightTrigger => device.bind_trigger_event(
                key,
                Box::new(move |value| {
                    target.borrow_mut().update_trigger_value(value);
                    Ok(())
                }),
            )?,
            _ => {
                return Err(CollectError::UnboundKey {
                    key: key.to_string(),
                    event: "gripper",
                });
            }
        }
    }

    manager.add_controller(controller.clone());
    Ok(controller)
}

/// Gripper replaying recorded motor commands.
pub fn add_gripper_replay_controller(
    manager: &mut CollectionManager,
    device: &mut ReplayDevice,
    gripper: &GripperConfig,
) -> Result<Shared<GripperController>> {
    let controller = create_gripper_controller(gripper, GripperMode::Replay)?;
    let target = Rc::clone(&controller);
    device.bind_dataset_event(
        EFFECTOR_MOTOR,
        motor_slice(gripper.side, gripper.actuator_names.len()),
        Box::new(move |sample| target.borrow_mut().update_ctrl(sample)),
    )?;
    manager.add_controller(controller.clone());
    Ok(controller)
}

/// Task status advanced by a grip button, debounced.
pub fn add_task_status_live_controller(
    manager: &mut CollectionManager,
    device: &mut LiveDevice,
    key: InputKey,
) -> Result<Shared<TaskStatusController>> {
    let controller = shared(TaskStatusController::debounced());
    let target = Rc::clone(&controller);
    device.bind_grip_button_event(
        key,
        Box::new(move |pressed| {
            target.borrow_mut().update_task_status(pressed);
            Ok(())
        }),
    )?;
    manager.set_task_status_controller(controller.clone());
    Ok(controller)
}

/// Task status advanced by the replay device at unit start and end.
pub fn add_task_status_replay_controller(
    manager: &mut CollectionManager,
    device: &mut ReplayDevice,
) -> Shared<TaskStatusController> {
    let controller = shared(TaskStatusController::immediate());
    let target = Rc::clone(&controller);
    device.bind_task_status_event(Box::new(move |advance| {
        target.borrow_mut().update_task_status(advance);
        Ok(())
    }));
    manager.set_task_status_controller(controller.clone());
    controller
}

/// Replay device for the configured dataset, with augmentation if configured.
pub fn build_replay_device(config: &CollectionConfig) -> Result<ReplayDevice> {
    let replay = config
        .replay
        .as_ref()
        .ok_or_else(|| CollectError::config("no [replay] section configured"))?;
    let mut device = ReplayDevice::from_dataset_dir(&replay.dataset_dir, &replay.unit_file)?;
    if let Some(aug) = &config.augmentation {
        device = device.with_interpolator(build_interpolator(aug));
        if let Some(seed) = aug.seed {
            device = device.with_seed(seed);
        }
    }
    Ok(device)
}
