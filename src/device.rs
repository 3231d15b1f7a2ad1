//! Per-tick input producers.

use crate::error::Result;
use crate::live::LiveDevice;
use crate::replay::ReplayDevice;

/// The device driving an episode, picked once when the pipeline is assembled.
pub enum Device {
    Live(LiveDevice),
    Replay(ReplayDevice),
}

impl Device {
    /// Runs the device's bindings for the current tick.
    pub fn update(&mut self) -> Result<()> {
        match self {
            Device::Live(device) => device.update(),
            Device::Replay(device) => device.update(),
        }
    }

    pub fn as_live_mut(&mut self) -> Option<&mut LiveDevice> {
        match self {
            Device::Live(device) => Some(device),
            Device::Replay(_) => None,
        }
    }

    pub fn as_replay_mut(&mut self) -> Option<&mut ReplayDevice> {
        match self {
            Device::Replay(device) => Some(device),
            Device::Live(_) => None,
        }
    }
}

impl From<LiveDevice> for Device {
    fn from(device: LiveDevice) -> Self {
        Device::Live(device)
    }
}

impl From<ReplayDevice> for Device {
    fn from(device: ReplayDevice) -> Self {
        Device::Replay(device)
    }
}
