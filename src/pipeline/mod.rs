//! The staged composition pipeline.

pub mod revision;
pub mod sequencer;
pub mod stage;
pub mod state;

pub use revision::{RevisionCycle, RoundReport};
pub use sequencer::{RunOutcome, RunStatus, Sequencer, SequencerConfig};
pub use stage::Stage;
pub use state::{InstrumentFailure, RunState};
