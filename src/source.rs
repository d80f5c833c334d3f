//! Everything that talks to the external media applications.

mod osascript;
mod poller;
mod probe;

pub use osascript::{OsaScriptProbe, ScriptedApp};
pub use poller::{PollResult, SourcePoller};
pub use probe::{PlayerCommand, Probe, RawSnapshot};
