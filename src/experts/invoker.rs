//! Parallel expert invocation with soft cancellation
//!
//! One task per selected role, each bounded by the per-expert timeout and a
//! semaphore scoped to the call. The whole fan-out is bounded by the turn
//! budget: when it elapses, still-running tasks are detached and reported as
//! abandoned, and their late results are never read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::clients::{CompletionRequest, CompletionService};
use crate::config::InvokerConfig;
use crate::errors::{ChatError, Result};
use crate::experts::prompts::parse_completion;
use crate::experts::router::MAX_CONCURRENCY;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{ExpertRole, ExpertSlice, Unavailability};

/// Slices for one turn, in the order the roles were requested
#[derive(Debug, Clone, Default)]
pub struct InvocationOutcome {
    pub slices: Vec<ExpertSlice>,
    /// True when the turn budget elapsed with tasks still running
    pub budget_elapsed: bool,
}

impl InvocationOutcome {
    pub fn usable(&self) -> impl Iterator<Item = &ExpertSlice> {
        self.slices.iter().filter(|s| s.is_usable())
    }

    pub fn usable_count(&self) -> usize {
        self.usable().count()
    }

    pub fn unavailable_roles(&self) -> Vec<ExpertRole> {
        self.slices
            .iter()
            .filter(|s| !s.is_usable())
            .map(|s| s.role)
            .collect()
    }
}

type TaskOutput = (ExpertRole, Duration, Result<String>);

pub struct ExpertInvoker {
    completion: Arc<dyn CompletionService>,
    expert_timeout: Duration,
    turn_budget: Duration,
    telemetry: TelemetryCollector,
}

impl ExpertInvoker {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        config: &InvokerConfig,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self::with_budgets(completion, config.expert_timeout(), config.turn_budget(), telemetry)
    }

    pub fn with_budgets(
        completion: Arc<dyn CompletionService>,
        expert_timeout: Duration,
        turn_budget: Duration,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            completion,
            expert_timeout,
            turn_budget,
            telemetry,
        }
    }

    /// Run every request concurrently; never fails
    pub async fn invoke(&self, requests: Vec<CompletionRequest>) -> InvocationOutcome {
        let order: Vec<ExpertRole> = requests.iter().map(|r| r.role).collect();
        if order.is_empty() {
            return InvocationOutcome::default();
        }

        self.telemetry.record(TelemetryEvent::ExpertDispatch {
            experts: order.len(),
            timestamp: Instant::now(),
        });

        // Permits are per turn
        let semaphore = Arc::new(Semaphore::new(order.len().min(MAX_CONCURRENCY)));
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        for request in requests {
            let completion = self.completion.clone();
            let semaphore = semaphore.clone();
            let timeout = self.expert_timeout;

            tasks.spawn(async move {
                let role = request.role;
                let started = Instant::now();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => match tokio::time::timeout(timeout, completion.complete(&request)).await {
                        Ok(inner) => inner,
                        Err(_) => Err(ChatError::timeout(timeout)),
                    },
                    Err(_) => Err(ChatError::CompletionError("invoker is shutting down".to_string())),
                };
                (role, started.elapsed(), result)
            });
        }

        let deadline = tokio::time::Instant::now() + self.turn_budget;
        let mut finished: HashMap<ExpertRole, ExpertSlice> = HashMap::new();
        let mut budget_elapsed = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((role, elapsed, result)))) => {
                    let slice = self.to_slice(role, elapsed, result);
                    finished.insert(role, slice);
                }
                Ok(Some(Err(e))) => {
                    // Panicked task; its role is filled in below
                    warn!(error = %e, "expert task failed to join");
                }
                Ok(None) => break,
                Err(_) => {
                    budget_elapsed = true;
                    tasks.detach_all();
                    break;
                }
            }
        }

        let slices = order
            .into_iter()
            .map(|role| {
                finished.remove(&role).unwrap_or_else(|| {
                    let reason = if budget_elapsed {
                        self.telemetry.record(TelemetryEvent::ExpertAbandoned {
                            role,
                            timestamp: Instant::now(),
                        });
                        Unavailability::Abandoned
                    } else {
                        self.telemetry.record(TelemetryEvent::ExpertFailed {
                            role,
                            reason: "task panicked".to_string(),
                            timestamp: Instant::now(),
                        });
                        Unavailability::Failed {
                            reason: "task panicked".to_string(),
                        }
                    };
                    ExpertSlice::unavailable(role, reason)
                })
            })
            .collect();

        if budget_elapsed {
            warn!(
                budget_ms = self.turn_budget.as_millis() as u64,
                "turn budget elapsed; merging with the slices available"
            );
        }

        InvocationOutcome {
            slices,
            budget_elapsed,
        }
    }

    fn to_slice(&self, role: ExpertRole, elapsed: Duration, result: Result<String>) -> ExpertSlice {
        match result {
            Ok(text) => {
                let (rationale, content) = parse_completion(&text);
                if content.trim().is_empty() {
                    debug!(%role, "expert returned no content");
                    self.telemetry.record(TelemetryEvent::ExpertFailed {
                        role,
                        reason: "empty completion".to_string(),
                        timestamp: Instant::now(),
                    });
                    return ExpertSlice::unavailable(role, Unavailability::Empty);
                }

                debug!(%role, elapsed_ms = elapsed.as_millis() as u64, "expert completed");
                self.telemetry.record(TelemetryEvent::ExpertCompleted {
                    role,
                    duration_ms: elapsed.as_millis() as u64,
                    timestamp: Instant::now(),
                });
                ExpertSlice::new(role, rationale, content)
            }
            Err(ChatError::Timeout { duration_ms }) => {
                warn!(%role, duration_ms, "expert timed out");
                self.telemetry.record(TelemetryEvent::ExpertTimedOut {
                    role,
                    timestamp: Instant::now(),
                });
                ExpertSlice::unavailable(role, Unavailability::TimedOut { after_ms: duration_ms })
            }
            Err(e) => {
                warn!(%role, error = %e, "expert failed");
                self.telemetry.record(TelemetryEvent::ExpertFailed {
                    role,
                    reason: e.to_string(),
                    timestamp: Instant::now(),
                });
                ExpertSlice::unavailable(role, Unavailability::Failed { reason: e.to_string() })
            }
        }
    }
}
