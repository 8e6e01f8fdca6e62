//! Stream knobs (spec §6).

use serde::{Deserialize, Serialize};

/// Per-agent stream tuning. `single_writer` records the invariant that
/// only an agent's own kernel ever calls `produce` on its stream; no
/// mechanism here enforces it since it already holds by construction
/// (only `GAgentKernel::publish` has a stream handle), but the knob is
/// kept so a loaded config can assert the assumption it was written
/// under.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamKnobs {
    /// Bounded channel capacity for each subscriber of a stream.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Whether the stream is expected to have a single producer.
    #[serde(default = "default_true")]
    pub single_writer: bool,
}

fn default_channel_capacity() -> usize {
    100
}
fn default_true() -> bool {
    true
}

impl Default for StreamKnobs {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            single_writer: default_true(),
        }
    }
}
