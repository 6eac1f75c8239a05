//! # Transaction Manager
//!
//! Every request the gateway receives is one transaction, keyed by its
//! transaction id. [`TransactionManager::execute`] starts the command in its
//! own task and returns at once; the task reports back through
//! [`TransactionManager::on_transaction_event`], which sends the response and
//! moves the transaction to the completed set.
//!
//! Call agents retransmit requests they have no answer for. A retransmission
//! never runs the command again:
//!
//! - while the command is running it is dropped
//! - once the command has finished, the cached response is sent again
//!
//! Completed responses are kept for the configured retention (30 s by
//! default) and purged periodically.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rvoip_mgcp_core::{MgcpMessage, MgcpRequest, MgcpResponse, TransactionId, Verb};
use rvoip_mgcp_transport::Transport;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::command::{CommandContext, CommandProvider, MgcpCommand};
use crate::errors::{GatewayError, Result};
use crate::registry::MessageDirection;

/// Shortest interval between purges of completed transactions
const MIN_PURGE_INTERVAL: Duration = Duration::from_millis(100);

/// What [`TransactionManager::execute`] did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// New transaction, command started
    Started,
    /// Retransmission of a running transaction, dropped
    InProgress,
    /// Retransmission of a completed transaction, response sent again
    Repeated,
}

enum Admission {
    New,
    Running,
    Finished(MgcpResponse),
}

#[derive(Debug)]
struct ActiveTransaction {
    verb: Verb,
    source: SocketAddr,
    started_at: Instant,
}

#[derive(Debug)]
struct CompletedTransaction {
    response: MgcpResponse,
    completed_at: Instant,
}

struct ManagerInner {
    transport: Arc<dyn Transport>,
    context: Arc<CommandContext>,
    active: DashMap<TransactionId, ActiveTransaction>,
    completed: DashMap<TransactionId, CompletedTransaction>,
    retention: Duration,
    purge_task: Mutex<Option<JoinHandle<()>>>,
}

/// Runs commands and answers retransmissions
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl TransactionManager {
    pub fn new(transport: Arc<dyn Transport>, context: Arc<CommandContext>, retention: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                context,
                active: DashMap::new(),
                completed: DashMap::new(),
                retention,
                purge_task: Mutex::new(None),
            }),
        }
    }

    pub fn context(&self) -> &Arc<CommandContext> {
        &self.inner.context
    }

    /// Start purging expired completed transactions
    pub fn start(&self) {
        let mut purge_task = self.inner.purge_task.lock();
        if purge_task.is_some() {
            return;
        }
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let period = (self.inner.retention / 2).max(MIN_PURGE_INTERVAL);
        *purge_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let purged = TransactionManager { inner }.purge_expired();
                if purged > 0 {
                    trace!("Purged {} completed transaction(s)", purged);
                }
            }
        }));
        debug!("Transaction manager started, retention {:?}", self.inner.retention);
    }

    /// Handle a request from `source`
    pub async fn execute(&self, request: MgcpRequest, source: SocketAddr) -> ExecuteOutcome {
        let transaction_id = request.transaction_id;
        let verb = request.verb;
        if let Some(outcome) = self.admit(transaction_id, verb, source).await {
            return outcome;
        }

        match CommandProvider::provide(request) {
            Ok(command) => self.spawn(command),
            Err(e) => {
                debug!("{} {} rejected before execution: {}", verb, transaction_id, e);
                self.complete_logged(transaction_id, Err(e)).await;
            }
        }
        ExecuteOutcome::Started
    }

    /// Run an already built command as a new transaction
    pub async fn execute_command(&self, command: Box<dyn MgcpCommand>, source: SocketAddr) -> ExecuteOutcome {
        if let Some(outcome) = self.admit(command.transaction_id(), command.verb(), source).await {
            return outcome;
        }
        self.spawn(command);
        ExecuteOutcome::Started
    }

    /// Register a new transaction, or answer a retransmission
    ///
    /// Returns `None` when the caller owns a freshly started transaction.
    async fn admit(&self, transaction_id: TransactionId, verb: Verb, source: SocketAddr) -> Option<ExecuteOutcome> {
        let admission = match self.inner.active.entry(transaction_id) {
            Entry::Occupied(_) => Admission::Running,
            Entry::Vacant(slot) => {
                // Completion caches before it frees the active slot, so with the
                // slot locked a finished transaction is always visible here
                match self.inner.completed.get(&transaction_id) {
                    Some(completed) => Admission::Finished(completed.response.clone()),
                    None => {
                        slot.insert(ActiveTransaction {
                            verb,
                            source,
                            started_at: Instant::now(),
                        });
                        Admission::New
                    }
                }
            }
        };

        match admission {
            Admission::New => {
                trace!("{} {} started", verb, transaction_id);
                None
            }
            Admission::Running => {
                debug!("{} {} retransmitted while in progress, ignoring", verb, transaction_id);
                Some(ExecuteOutcome::InProgress)
            }
            Admission::Finished(response) => {
                debug!("{} {} retransmitted after completion, repeating response", verb, transaction_id);
                self.send(response, source).await;
                Some(ExecuteOutcome::Repeated)
            }
        }
    }

    fn spawn(&self, command: Box<dyn MgcpCommand>) {
        let transaction_id = command.transaction_id();
        let verb = command.verb();
        let execution = tokio::spawn(command.execute(Arc::clone(&self.inner.context)));
        let manager = self.clone();
        tokio::spawn(async move {
            let result = match execution.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    error!("{} {} panicked", verb, transaction_id);
                    Err(GatewayError::Aborted {
                        reason: format!("{} command panicked", verb),
                    })
                }
                Err(e) => Err(GatewayError::Aborted { reason: e.to_string() }),
            };
            manager.complete_logged(transaction_id, result).await;
        });
    }

    async fn complete_logged(&self, transaction_id: TransactionId, result: Result<MgcpResponse>) {
        if let Err(e) = self.on_transaction_event(transaction_id, result).await {
            error!("Completing transaction {} failed: {}", transaction_id, e);
        }
    }

    /// Finish a transaction with the outcome of its command
    ///
    /// Errors are turned into a response carrying their return code. A
    /// transaction can only be finished once.
    pub async fn on_transaction_event(
        &self,
        transaction_id: TransactionId,
        result: Result<MgcpResponse>,
    ) -> Result<()> {
        let Some(source) = self.inner.active.get(&transaction_id).map(|active| active.source) else {
            return Err(GatewayError::TransactionConflict { transaction_id });
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if e.return_code().is_transient() {
                    debug!("Transaction {} failed transiently: {}", transaction_id, e);
                } else {
                    warn!("Transaction {} failed: {}", transaction_id, e);
                }
                MgcpResponse::with_message(e.return_code(), transaction_id, e.to_string())
            }
        };

        // Cached before leaving the active set; `admit` relies on this order
        self.inner.completed.insert(
            transaction_id,
            CompletedTransaction {
                response: response.clone(),
                completed_at: Instant::now(),
            },
        );
        let Some((_, active)) = self.inner.active.remove(&transaction_id) else {
            return Err(GatewayError::TransactionConflict { transaction_id });
        };

        info!(
            "{} {} completed with {} in {:?}",
            active.verb,
            transaction_id,
            response.code,
            active.started_at.elapsed()
        );
        self.send(response, source).await;
        Ok(())
    }

    async fn send(&self, response: MgcpResponse, destination: SocketAddr) {
        let message = MgcpMessage::Response(response);
        self.inner
            .context
            .registry
            .observers()
            .notify(&message, MessageDirection::Outgoing, destination);
        if let Err(e) = self.inner.transport.send_message(message, destination).await {
            warn!("Failed to send response to {}: {}", destination, e);
        }
    }

    /// Drop completed transactions older than the retention
    pub fn purge_expired(&self) -> usize {
        let retention = self.inner.retention;
        let before = self.inner.completed.len();
        self.inner
            .completed
            .retain(|_, completed| completed.completed_at.elapsed() < retention);
        before.saturating_sub(self.inner.completed.len())
    }

    pub fn is_active(&self, transaction_id: TransactionId) -> bool {
        self.inner.active.contains_key(&transaction_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    pub fn completed_count(&self) -> usize {
        self.inner.completed.len()
    }

    /// Response cached for a completed transaction
    pub fn completed_response(&self, transaction_id: TransactionId) -> Option<MgcpResponse> {
        self.inner
            .completed
            .get(&transaction_id)
            .map(|completed| completed.response.clone())
    }

    /// Stop the purge task
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.purge_task.lock().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active", &self.active_count())
            .field("completed", &self.completed_count())
            .field("retention", &self.inner.retention)
            .finish()
    }
}
