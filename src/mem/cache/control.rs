//! The control stage.
//!
//! Serves pause, continue and invalidate commands on the control port and
//! acknowledges each one. It keeps ticking while the data pipeline is paused.

use tracing::debug;

use super::CacheCore;
use crate::mem::{ControlCmd, MemMsg, MemPayload};
use crate::pipeline::Stage;
use crate::types::SimTime;

/// Applies commands arriving on the control port.
///
/// The acknowledgement must fit on the control port before the command takes
/// effect.
pub(super) struct ControlStage;

impl Stage<CacheCore> for ControlStage {
    fn tick(&mut self, c: &mut CacheCore, now: SimTime) -> bool {
        if c.control_port.num_incoming() == 0 || !c.control_port.can_send() {
            return false;
        }
        let id = c.next_msg_id();

        let (cmd, ack) = {
            let Some(req) = c.control_port.peek() else {
                return false;
            };
            let MemPayload::Control(cmd) = req.payload else {
                panic!("{}: cannot process {:?} on the control port", c.name, req.payload);
            };
            (cmd, MemMsg::control_ack(id, &req, now, cmd))
        };

        if c.control_port.send(ack).is_err() {
            return false;
        }

        match cmd {
            ControlCmd::Pause => c.paused = true,
            ControlCmd::Continue => c.paused = false,
            ControlCmd::Invalidate => c.directory.reset(),
        }
        c.control_port.retrieve(now);
        c.stats.control_msgs += 1;
        debug!(cache = %c.name, ?cmd, "control command applied");
        true
    }
}
