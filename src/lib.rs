//! # dualarm-collect
//!
//! Demonstration collection for a simulated dual-arm manipulator with parallel grippers.
//!
//! A [`CollectionManager`] runs episodes against a [`SimEnvironment`]. Each tick a
//! [`Device`] feeds the registered controllers, either from a live headset
//! ([`LiveDevice`]) or from recorded dataset units ([`ReplayDevice`]). The controllers'
//! actuator commands are merged into one command vector and the simulation is stepped.
//! Successful episodes are handed to a [`DataStorage`]. Replayed units can be densified
//! on load by an [`Interpolator`], so a small set of demonstrations turns into a larger,
//! noised dataset.
//!
//! Physics, scene randomization, task predicates and the pose-tracking solver are
//! collaborators behind the traits in [`env`].

pub mod adaptive;
pub mod arm;
pub mod augment;
pub mod config;
pub mod controller;
pub mod dataset;
pub mod device;
pub mod env;
pub mod error;
pub mod factory;
pub mod frames;
pub mod gripper;
pub mod live;
pub mod manager;
pub mod replay;
pub mod smooth;
pub mod task_status;

pub use adaptive::*;
pub use arm::*;
pub use augment::*;
pub use config::*;
pub use controller::*;
pub use dataset::*;
pub use device::*;
pub use env::*;
pub use error::*;
pub use factory::*;
pub use frames::*;
pub use gripper::*;
pub use live::*;
pub use manager::*;
pub use replay::*;
pub use smooth::*;
pub use task_status::*;
