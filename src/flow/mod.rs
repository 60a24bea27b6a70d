//! Receipt capture flow: one active flow, navigation rules and a bounded
//! log of finished flows.

mod machine;
mod types;

pub use machine::{FlowMachine, FlowStateError, RECENT_FLOWS_CAPACITY};
pub use types::{
    Flow, FlowError, FlowId, FlowMetrics, FlowStep, FlowSummary, FlowUpdate, StepTransition,
};
