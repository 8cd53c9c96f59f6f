// src/platform.rs
//
// Seams to the external vehicle platform. The supervisor only ever talks
// to these traits; the binary wires in the synthetic rig from `sim`, a
// real deployment implements them against its simulator or vehicle bus.

use crate::sensor_buffer::SensorHub;
use crate::types::{ActuationCommand, ManualIntent};
use anyhow::Result;
use std::sync::Arc;

/// Outbound control: engage/release the platform's autopilot and push one
/// actuation command per tick while in manual mode.
pub trait ControlSink: Send {
    fn set_autopilot(&mut self, engaged: bool) -> Result<()>;
    fn apply_control(&mut self, command: &ActuationCommand) -> Result<()>;
}

/// Key/button state of the human operator, sampled once per tick.
pub trait IntentSource: Send {
    fn sample(&mut self) -> ManualIntent;
}

/// Owner of the platform's sensor listeners. `attach` registers callbacks
/// that push frames into the hub; `detach` must release every listener and
/// runs on every exit path, fatal ones included.
pub trait SensorRig: Send {
    fn attach(&mut self, hub: Arc<SensorHub>) -> Result<()>;
    fn detach(&mut self);
}
