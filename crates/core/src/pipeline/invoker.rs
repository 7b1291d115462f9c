//! # Agent Invoker
//!
//! Shared retry loop for collaborator calls:
//! build request → invoke → parse → shape-validate → accept.
//!
//! Any rejected attempt (transport error, timeout, unparsable response,
//! failed shape check) is retried after `min(base * 2^retry, cap)` until
//! `max_retries + 1` attempts have been made.

use std::sync::Arc;

use super::config::RetryPolicy;
use super::error::{AttemptError, InvokeError};
use crate::agents::{AgentRequest, Collaborator};
use crate::phases::PhaseContract;

/// Accepted output plus the number of attempts it took
#[derive(Debug, Clone)]
pub struct Invocation<O> {
    pub output: O,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct AgentInvoker {
    collaborator: Arc<dyn Collaborator>,
    policy: RetryPolicy,
}

impl AgentInvoker {
    pub fn new(collaborator: Arc<dyn Collaborator>, policy: RetryPolicy) -> Self {
        Self {
            collaborator,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke<P: PhaseContract>(
        &self,
        run_id: &str,
        iteration: u32,
        input: &P::Input,
    ) -> Result<Invocation<P::Output>, InvokeError> {
        let payload = P::build_request(input).map_err(|e| InvokeError::Request {
            phase: P::PHASE,
            reason: e.to_string(),
        })?;

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = AgentRequest {
                run_id: run_id.to_string(),
                phase: P::PHASE,
                iteration,
                attempt,
                payload: payload.clone(),
            };

            let error = match self.attempt::<P>(request).await {
                Ok(output) => {
                    if attempt > 1 {
                        tracing::info!(
                            phase = %P::PHASE,
                            attempt,
                            "Collaborator succeeded after retry"
                        );
                    }
                    return Ok(Invocation {
                        output,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    phase = %P::PHASE,
                    attempts = attempt,
                    "Retries exhausted: {}",
                    error
                );
                return Err(InvokeError::Exhausted {
                    phase: P::PHASE,
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.delay_for(attempt - 1);
            tracing::warn!(
                phase = %P::PHASE,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying: {}",
                error
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn attempt<P: PhaseContract>(
        &self,
        request: AgentRequest,
    ) -> Result<P::Output, AttemptError> {
        let call = self.collaborator.invoke(request);
        let raw = match tokio::time::timeout(self.policy.timeout(), call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(AttemptError::Transport(format!("{:#}", e))),
            Err(_) => return Err(AttemptError::Timeout(self.policy.timeout_ms)),
        };

        let output = P::parse(raw)?;
        let problems = P::validate_shape(&output);
        if problems.is_empty() {
            Ok(output)
        } else {
            Err(AttemptError::Shape(problems))
        }
    }
}
