//! Per-connection lifecycle: preparation, upstream acquisition, the relay task
//! group, and a single coordinated shutdown.

use crate::{
    config::SessionConfig,
    error::SessionError,
    interview::{InterviewPreparer, SessionRequest},
    protocol::ServerMessage,
    queue::backpressure_queue,
    relay::{ClientForwarder, InboundRelay, UpstreamSender},
    session::{ActiveFlag, SessionHandle, TaskExit, TaskKind},
    silence::SilenceMonitor,
    transport::{ClientSink, ClientStream},
    upstream::{UpstreamConnector, UpstreamLease, UpstreamSession},
};
use futures::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

type TaskOutcome = Result<TaskExit, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Ready,
    Active,
    Ending,
    Closed,
}

impl SessionPhase {
    fn can_enter(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Initializing, Ready)
                | (Initializing, Closed)
                | (Ready, Active)
                | (Ready, Ending)
                | (Ready, Closed)
                | (Active, Ending)
                | (Ending, Closed)
        )
    }
}

/// Why a session finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    ClientEnded,
    ClientDisconnected,
    Cancelled,
    PreconditionFailed(String),
    Fault(String),
}

impl From<TaskExit> for EndReason {
    fn from(exit: TaskExit) -> Self {
        match exit {
            TaskExit::ClientEnded => EndReason::ClientEnded,
            TaskExit::ClientDisconnected => EndReason::ClientDisconnected,
            TaskExit::Cancelled | TaskExit::QueueClosed => EndReason::Cancelled,
        }
    }
}

impl From<&SessionError> for EndReason {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::Precondition(reason) => EndReason::PreconditionFailed(reason.clone()),
            other => EndReason::Fault(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub end_reason: EndReason,
    /// Every phase the session went through, in order. Always ends with
    /// [`SessionPhase::Closed`].
    pub phases: Vec<SessionPhase>,
}

/// Drives one client connection from handshake to close.
pub struct SessionSupervisor {
    config: SessionConfig,
    connector: Arc<dyn UpstreamConnector>,
    preparer: Arc<dyn InterviewPreparer>,
    client: Arc<dyn ClientSink>,
    active: ActiveFlag,
    phases: Vec<SessionPhase>,
}

impl SessionSupervisor {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn UpstreamConnector>,
        preparer: Arc<dyn InterviewPreparer>,
        client: Arc<dyn ClientSink>,
    ) -> Self {
        Self {
            config,
            connector,
            preparer,
            client,
            active: ActiveFlag::new(),
            phases: vec![SessionPhase::Initializing],
        }
    }

    /// Clearing this flag from outside shuts the session down.
    pub fn active_flag(&self) -> ActiveFlag {
        self.active.clone()
    }

    pub async fn run(mut self, request: SessionRequest, incoming: ClientStream) -> SessionReport {
        let prompt = match self.initialize(&request).await {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "Session rejected before connecting upstream.");
                self.notify(&e).await;
                return self.close(EndReason::from(&e));
            }
        };
        self.enter(SessionPhase::Ready);

        let acquired = tokio::select! {
            biased;
            _ = self.active.cleared() => None,
            acquired = UpstreamLease::acquire(self.connector.as_ref()) => Some(acquired),
        };
        let lease = match acquired {
            None => return self.close(EndReason::Cancelled),
            Some(Ok(lease)) => lease,
            Some(Err(e)) => {
                let e = SessionError::from(e);
                error!(error = %e, "Could not open the upstream session.");
                self.enter(SessionPhase::Ending);
                self.notify(&e).await;
                return self.close(EndReason::from(&e));
            }
        };

        let session = lease.session();
        let outcome = match self.prime(session.as_ref(), &prompt).await {
            Ok(()) => {
                self.enter(SessionPhase::Active);
                self.run_active(session, incoming).await
            }
            Err(e) => Err(e),
        };

        self.enter(SessionPhase::Ending);
        self.active.deactivate();
        lease.release().await;

        let reason = match outcome {
            Ok(exit) => EndReason::from(exit),
            Err(e) => {
                error!(error = %e, "Session ended by a fault.");
                self.notify(&e).await;
                EndReason::from(&e)
            }
        };
        self.close(reason)
    }

    /// Validates the request and prepares the priming prompt.
    async fn initialize(&mut self, request: &SessionRequest) -> Result<String, SessionError> {
        request.validate().map_err(SessionError::Precondition)?;
        if let Some(gain) = request.gain().map_err(SessionError::Precondition)? {
            self.config.gain = gain;
        }
        self.config.validate().map_err(SessionError::Precondition)?;

        let name = request.candidate_name().unwrap_or_default();
        info!(candidate = %name, "Preparing interview.");
        let prompt = self
            .preparer
            .prepare(name, &request.documents)
            .await
            .map_err(|e| {
                error!(error = ?e, "Interview preparation failed.");
                SessionError::Precondition("Failed to prepare interview".to_string())
            })?;
        self.client.send(ServerMessage::prepared()).await?;

        if prompt.is_empty() {
            Ok(self.config.initial_prompt.clone())
        } else {
            Ok(prompt)
        }
    }

    async fn prime(&self, session: &dyn UpstreamSession, prompt: &str) -> Result<(), SessionError> {
        if !prompt.is_empty() {
            debug!(chars = prompt.len(), "Sending initial prompt upstream.");
            session.send_text(prompt, true).await?;
        }
        self.client.send(ServerMessage::ready()).await?;
        Ok(())
    }

    /// Runs the relay tasks until the first one exits, then shuts the rest down.
    async fn run_active(
        &self,
        session: Arc<dyn UpstreamSession>,
        incoming: ClientStream,
    ) -> TaskOutcome {
        info!(
            gain = self.config.gain,
            inbound_hz = self.config.inbound_sample_rate,
            outbound_hz = self.config.outbound_sample_rate,
            queue_capacity = self.config.queue_capacity,
            "Interview session active."
        );
        let (producer, consumer) = backpressure_queue(self.config.queue_capacity);
        let handle = SessionHandle::new(
            self.active.clone(),
            producer,
            Arc::new(self.config.clone()),
        );

        let mut tasks = JoinSet::new();
        let inbound = InboundRelay::new(handle.clone(), session.clone(), self.client.clone());
        self.spawn(&mut tasks, TaskKind::InboundRelay, inbound.run(incoming));
        let sender = UpstreamSender::new(self.active.clone(), consumer, session.clone());
        self.spawn(&mut tasks, TaskKind::UpstreamSender, sender.run());
        let forwarder = ClientForwarder::new(self.active.clone(), session, self.client.clone());
        self.spawn(&mut tasks, TaskKind::ClientForwarder, forwarder.run());
        self.spawn(&mut tasks, TaskKind::SilenceMonitor, SilenceMonitor::new(handle).run());

        let mut decided = None;
        if let Some(joined) = tasks.join_next().await {
            settle(&mut decided, joined);
        }
        self.active.deactivate();

        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                settle(&mut decided, joined);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "Relay tasks did not stop within the grace period; aborting."
            );
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                settle(&mut decided, joined);
            }
        }

        decided.unwrap_or(Ok(TaskExit::Cancelled))
    }

    fn spawn<F>(&self, tasks: &mut JoinSet<TaskOutcome>, kind: TaskKind, task: F)
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let active = self.active.clone();
        let span = info_span!("relay_task", task = %kind);
        tasks.spawn(
            async move {
                let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        error!("Relay task panicked.");
                        Err(SessionError::Panicked { task: kind })
                    }
                };
                if active.deactivate() {
                    debug!(?outcome, "First relay task finished, shutting down the session.");
                }
                outcome
            }
            .instrument(span),
        );
    }

    async fn notify(&self, err: &SessionError) {
        if !err.notifies_client() {
            return;
        }
        if let Err(e) = self.client.send(ServerMessage::error(err.to_string())).await {
            debug!(error = %e, "Could not deliver error to client.");
        }
    }

    fn enter(&mut self, next: SessionPhase) {
        let current = self.phases.last().copied().unwrap_or(SessionPhase::Initializing);
        debug_assert!(
            current.can_enter(next),
            "invalid session phase transition {:?} -> {:?}",
            current,
            next
        );
        debug!(from = ?current, to = ?next, "Session phase change.");
        self.phases.push(next);
    }

    fn close(mut self, end_reason: EndReason) -> SessionReport {
        self.active.deactivate();
        self.enter(SessionPhase::Closed);
        info!(reason = ?end_reason, "Session closed.");
        SessionReport {
            end_reason,
            phases: self.phases,
        }
    }
}

/// Records a finished task. The first outcome that is not a plain shutdown
/// decides how the session ended.
fn settle(decided: &mut Option<TaskOutcome>, joined: Result<TaskOutcome, JoinError>) {
    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => return,
        Err(e) => {
            error!(error = %e, "Relay task failed to join.");
            return;
        }
    };
    let is_shutdown = matches!(outcome, Ok(TaskExit::Cancelled | TaskExit::QueueClosed));
    if decided.is_none() && !is_shutdown {
        *decided = Some(outcome);
    } else if let Err(e) = outcome {
        debug!(error = %e, "Relay task failed during shutdown.");
    }
}
