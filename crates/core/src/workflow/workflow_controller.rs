use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::frame_capturer::FrameCapturer;
use crate::gateway::domain::recognition_gateway::RecognitionGateway;
use crate::gateway::domain::service_response::{FailureReason, ServiceResponse};
use crate::workflow::domain::operation_kind::OperationKind;
use crate::workflow::domain::outcome::Outcome;
use crate::workflow::domain::workflow_error::WorkflowError;
use crate::workflow::domain::workflow_state::{TransitionError, WorkflowState};

/// Notifications for whoever renders the workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Started(OperationKind),
    Completed {
        kind: OperationKind,
        state: WorkflowState,
    },
    Rejected {
        kind: OperationKind,
        reason: WorkflowError,
    },
}

type Subscribers = Arc<Mutex<Vec<Sender<WorkflowEvent>>>>;

/// Runs register/verify/analyze operations against the recognition service.
///
/// The state lock is held from the busy check through capture and `begin`,
/// so two triggers can never both start. The gateway call itself runs on a
/// worker thread and its result is applied through exactly one completion.
pub struct WorkflowController {
    capturer: Mutex<Box<dyn FrameCapturer>>,
    gateway: Arc<dyn RecognitionGateway>,
    state: Arc<Mutex<WorkflowState>>,
    subscribers: Subscribers,
}

/// Handle to an operation whose gateway call is still running.
pub struct InFlight {
    kind: OperationKind,
    done: Receiver<WorkflowState>,
    state: Arc<Mutex<WorkflowState>>,
}

impl InFlight {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Blocks until the operation has completed and returns the state
    /// right after its completion was applied.
    pub fn wait(self) -> WorkflowState {
        self.done
            .recv()
            .unwrap_or_else(|_| lock(&self.state).clone())
    }
}

impl WorkflowController {
    pub fn new(capturer: Box<dyn FrameCapturer>, gateway: Arc<dyn RecognitionGateway>) -> Self {
        Self {
            capturer: Mutex::new(capturer),
            gateway,
            state: Arc::new(Mutex::new(WorkflowState::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the current state for rendering.
    pub fn state(&self) -> WorkflowState {
        lock(&self.state).clone()
    }

    pub fn subscribe(&self) -> Receiver<WorkflowEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Starts `kind` without waiting for the service.
    ///
    /// Refused with [`WorkflowError::Busy`] while another operation is in
    /// flight and with [`WorkflowError::CaptureUnavailable`] when no frame
    /// can be captured. Neither refusal changes the state.
    pub fn perform(&self, kind: OperationKind) -> Result<InFlight, WorkflowError> {
        let mut state = lock(&self.state);

        if let Some(active) = state.active_operation() {
            return Err(self.reject(kind, WorkflowError::Busy { requested: kind, active }));
        }

        let image = match lock(&self.capturer).capture() {
            Ok(image) => image,
            Err(source) => {
                return Err(self.reject(
                    kind,
                    WorkflowError::CaptureUnavailable {
                        requested: kind,
                        source,
                    },
                ))
            }
        };

        if let Err(TransitionError::AlreadyActive { active, .. }) = state.begin(kind) {
            return Err(self.reject(kind, WorkflowError::Busy { requested: kind, active }));
        }
        drop(state);

        log::info!("{kind} started ({} byte snapshot)", image.len());
        publish(&self.subscribers, WorkflowEvent::Started(kind));

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let gateway = Arc::clone(&self.gateway);
        let state = Arc::clone(&self.state);
        let subscribers = Arc::clone(&self.subscribers);

        let spawned = thread::Builder::new()
            .name(format!("facegate-{kind}"))
            .spawn(move || {
                let response =
                    panic::catch_unwind(AssertUnwindSafe(|| gateway.dispatch(kind, image)))
                        .unwrap_or_else(|_| {
                            Err(FailureReason::transport("recognition call panicked"))
                        });
                let snapshot = apply_completion(&state, &subscribers, kind, response);
                let _ = done_tx.send(snapshot);
            });

        if let Err(e) = spawned {
            log::error!("Could not start {kind} worker: {e}");
            apply_completion(
                &self.state,
                &self.subscribers,
                kind,
                Err(FailureReason::transport(format!(
                    "could not start {kind} request: {e}"
                ))),
            );
        }

        Ok(InFlight {
            kind,
            done: done_rx,
            state: Arc::clone(&self.state),
        })
    }

    /// [`perform`](Self::perform) followed by [`InFlight::wait`].
    pub fn perform_blocking(&self, kind: OperationKind) -> Result<WorkflowState, WorkflowError> {
        Ok(self.perform(kind)?.wait())
    }

    fn reject(&self, kind: OperationKind, reason: WorkflowError) -> WorkflowError {
        log::warn!("{reason}");
        publish(
            &self.subscribers,
            WorkflowEvent::Rejected {
                kind,
                reason: reason.clone(),
            },
        );
        reason
    }
}

/// Applies the single completion for `kind` and announces it.
fn apply_completion(
    state: &Mutex<WorkflowState>,
    subscribers: &Subscribers,
    kind: OperationKind,
    response: ServiceResponse<Outcome>,
) -> WorkflowState {
    let snapshot = {
        let mut state = lock(state);
        let applied = match response {
            Ok(outcome) => state.complete_success(kind, outcome),
            Err(reason) => state.complete_failure(kind, reason),
        };
        if let Err(e) = applied {
            log::error!("{kind} result discarded: {e}");
        }
        state.clone()
    };

    log::info!("{kind} finished");
    publish(
        subscribers,
        WorkflowEvent::Completed {
            kind,
            state: snapshot.clone(),
        },
    );
    snapshot
}

fn publish(subscribers: &Subscribers, event: WorkflowEvent) {
    lock(subscribers).retain(|tx| tx.send(event.clone()).is_ok());
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
