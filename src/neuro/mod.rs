pub mod commands;
pub mod controller;
pub mod device;
pub mod emotions;
pub mod simulated;
pub mod types;

pub use controller::{MathFactory, NeuroController};
pub use types::{
    DeviceStatus, ResistSample, SensorInfo, SensorState, SensorStatus, SignalSample, StreamKind,
};
