//! Single-active-flow state machine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::flow::types::{
    Flow, FlowError, FlowId, FlowStep, FlowSummary, FlowUpdate, StepTransition,
};
use crate::utils::PipelineError;

/// How many finished flows the recent log keeps.
pub const RECENT_FLOWS_CAPACITY: usize = 10;

/// Errors from flow lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowStateError {
    /// A flow is already running; complete or cancel it first
    #[error("flow {0} is already active")]
    AlreadyActive(FlowId),
    /// The operation needs an active flow and there is none
    #[error("no active flow")]
    NoActiveFlow,
}

struct MachineState {
    active: Option<Flow>,
    recent: VecDeque<FlowSummary>,
}

struct Inner {
    state: Mutex<MachineState>,
    watch_tx: watch::Sender<Option<Flow>>,
}

/// Owns the one active flow plus a bounded log of finished ones.
///
/// Cheap to clone; clones share state. Observers subscribe to a watch
/// channel carrying a snapshot of the active flow after every accepted
/// mutation; rejected operations publish nothing.
#[derive(Clone)]
pub struct FlowMachine {
    inner: Arc<Inner>,
}

impl FlowMachine {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MachineState {
                    active: None,
                    recent: VecDeque::with_capacity(RECENT_FLOWS_CAPACITY),
                }),
                watch_tx,
            }),
        }
    }

    /// Starts a new flow at the capture step.
    ///
    /// Exactly one flow may run at a time; starting while one is active is
    /// an error, never an implicit cancel.
    pub fn start_flow(&self, image_uri: impl Into<String>) -> Result<Flow, FlowStateError> {
        let image_uri = image_uri.into();
        self.mutate(|state| {
            if let Some(active) = &state.active {
                warn!(flow_id = %active.id, "refusing to start a flow while one is active");
                return Err(FlowStateError::AlreadyActive(active.id));
            }
            let flow = Flow::new(image_uri);
            info!(flow_id = %flow.id, image_uri = %flow.image_uri, "flow started");
            state.active = Some(flow.clone());
            Ok(flow)
        })
    }

    /// Applies a partial update to the active flow and returns the new
    /// snapshot.
    ///
    /// A step change folds the time spent in the old step into the metrics
    /// and records a transition; updating to the current step records
    /// nothing.
    pub fn update_flow(&self, update: FlowUpdate) -> Result<Flow, FlowStateError> {
        self.mutate(|state| {
            let flow = state.active.as_mut().ok_or(FlowStateError::NoActiveFlow)?;
            let now = Utc::now();

            if let Some(step) = update.current_step {
                if step != flow.current_step {
                    let elapsed = (now - flow.step_entered_at).num_milliseconds().max(0) as u64;
                    *flow.metrics.step_durations.entry(flow.current_step).or_insert(0) += elapsed;
                    flow.transitions.push(StepTransition {
                        from: flow.current_step,
                        to: step,
                        reason: update.step_reason.clone(),
                        timestamp: now,
                    });
                    flow.step_history.push(step);
                    debug!(flow_id = %flow.id, from = %flow.current_step, to = %step, "flow step changed");
                    flow.current_step = step;
                    flow.step_entered_at = now;
                }
            }
            if let Some(uri) = update.image_uri {
                flow.image_uri = uri;
            }
            if let Some(result) = update.ocr_result {
                flow.ocr_result = Some(result);
            }
            if let Some(draft) = update.receipt_draft {
                flow.receipt_draft = Some(draft);
            }
            flow.metrics.total_duration_ms = (now - flow.timestamp).num_milliseconds().max(0) as u64;
            Ok(flow.clone())
        })
    }

    /// Whether the UI may jump to `step` right now.
    ///
    /// Revisiting any step already in the history is always allowed; going
    /// forward requires that step's inputs to exist. Without an active
    /// flow nothing is navigable.
    pub fn can_navigate_to(&self, step: FlowStep) -> bool {
        let state = self.lock_state();
        let Some(flow) = &state.active else {
            return false;
        };
        if flow.step_history.contains(&step) {
            return true;
        }
        match step {
            FlowStep::Capture => true,
            FlowStep::Processing => !flow.image_uri.is_empty(),
            FlowStep::Review | FlowStep::Verification => flow.ocr_result.is_some(),
            FlowStep::Report => flow.receipt_draft.is_some(),
        }
    }

    /// Records an error against the active flow at its current step.
    pub fn record_error(&self, err: &PipelineError) -> Result<Flow, FlowStateError> {
        self.mutate(|state| {
            let flow = state.active.as_mut().ok_or(FlowStateError::NoActiveFlow)?;
            let error = FlowError::from_pipeline(flow.current_step, err);
            warn!(flow_id = %flow.id, step = %error.step, code = %error.code, "flow error recorded");
            flow.metrics.error_count += 1;
            flow.last_error = Some(error.clone());
            flow.error_history.push(error);
            Ok(flow.clone())
        })
    }

    /// Counts a user-initiated retry of the current step.
    pub fn record_retry(&self) -> Result<Flow, FlowStateError> {
        self.mutate(|state| {
            let flow = state.active.as_mut().ok_or(FlowStateError::NoActiveFlow)?;
            flow.metrics.retry_count += 1;
            // last_error only describes the most recent failed attempt
            flow.last_error = None;
            debug!(flow_id = %flow.id, retries = flow.metrics.retry_count, "flow retry recorded");
            Ok(flow.clone())
        })
    }

    /// Completes the active flow and retires it into the recent log.
    pub fn complete_flow(&self) -> Result<FlowSummary, FlowStateError> {
        self.mutate(|state| {
            let mut flow = state.active.take().ok_or(FlowStateError::NoActiveFlow)?;
            let now = Utc::now();
            let elapsed = (now - flow.step_entered_at).num_milliseconds().max(0) as u64;
            *flow.metrics.step_durations.entry(flow.current_step).or_insert(0) += elapsed;
            flow.metrics.total_duration_ms = (now - flow.timestamp).num_milliseconds().max(0) as u64;
            flow.is_complete = true;
            info!(
                flow_id = %flow.id,
                total_duration_ms = flow.metrics.total_duration_ms,
                errors = flow.metrics.error_count,
                "flow completed"
            );
            let summary = FlowSummary::of(&flow);
            push_recent(&mut state.recent, summary.clone());
            Ok(summary)
        })
    }

    /// Cancels the active flow, retiring it as incomplete. The reason is
    /// informational and may be omitted.
    pub fn cancel_flow(&self, reason: Option<&str>) -> Result<FlowSummary, FlowStateError> {
        self.mutate(|state| {
            let flow = state.active.take().ok_or(FlowStateError::NoActiveFlow)?;
            info!(
                flow_id = %flow.id,
                reason = reason.unwrap_or("unspecified"),
                step = %flow.current_step,
                "flow cancelled"
            );
            let summary = FlowSummary::of(&flow);
            push_recent(&mut state.recent, summary.clone());
            Ok(summary)
        })
    }

    /// Snapshot of the active flow, if any.
    pub fn active(&self) -> Option<Flow> {
        self.lock_state().active.clone()
    }

    /// Summaries of recently finished flows, newest first.
    pub fn recent_flows(&self) -> Vec<FlowSummary> {
        self.lock_state().recent.iter().rev().cloned().collect()
    }

    /// Subscribes to active-flow snapshots. The current value is readable
    /// immediately via `borrow`.
    pub fn subscribe(&self) -> watch::Receiver<Option<Flow>> {
        self.inner.watch_tx.subscribe()
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut MachineState) -> Result<T, FlowStateError>,
    ) -> Result<T, FlowStateError> {
        let mut state = self.lock_state();
        let result = f(&mut state);
        // published under the lock so observers see mutations in order;
        // a rejected operation leaves state untouched and stays silent
        if result.is_ok() {
            self.inner.watch_tx.send_replace(state.active.clone());
        }
        result
    }

    fn lock_state(&self) -> MutexGuard<'_, MachineState> {
        // Lock invariant: held only for in-memory mutation, never across await.
        self.inner.state.lock().expect("flow state lock poisoned")
    }
}

impl Default for FlowMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn push_recent(recent: &mut VecDeque<FlowSummary>, summary: FlowSummary) {
    if recent.len() == RECENT_FLOWS_CAPACITY {
        recent.pop_front();
    }
    recent.push_back(summary);
}
