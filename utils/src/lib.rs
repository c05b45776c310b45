pub mod cmd;
pub mod decide;
pub mod poll;

pub use cmd::{Cmd, CmdReport, CmdStatus};
pub use decide::{
    AutoDecisions, ConsoleDecisions, DecisionContext, DecisionProvider, FlashDecision,
    TestDecision,
};
pub use poll::poll_until;
