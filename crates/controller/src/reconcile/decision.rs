// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase transition decisions.
//!
//! `decide_live` and `decide_rest` are pure: they map the persisted phase
//! plus what the reconciler observed to a single step. The executors in
//! `live.rs`/`rest.rs` gather observations, run the decision, persist the
//! status change, then perform side effects. Keeping the table pure is what
//! makes the state machine testable without a cluster.

use std::time::Duration;

use chrono::{DateTime, Utc};
use cliapp_api::Phase;

use crate::build::{BuildError, BuildStatus};
use crate::config::DEFAULT_REQUEUE;

/// When to look again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for the next watch event.
    OnChange,
    /// Requeue right away.
    Immediate,
    /// Requeue after a computed interval.
    After(Duration),
}

/// The workload candidate the claim pass settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A ready pod matching the current spec.
    Ready(String),
    /// A matching pod that is still booting.
    Starting(String),
    /// Nothing matches the current spec.
    NoCandidate,
}

/// What the reconciler observed before deciding a Live-target step.
#[derive(Debug, Clone, Default)]
pub struct LiveObserved {
    /// `spec.image` empty and `spec.fork` unset: the image must be built.
    pub needs_build: bool,
    pub has_dockerfile: bool,
    pub builder_configured: bool,
    /// Present when the phase required a claim pass.
    pub claim: Option<ClaimOutcome>,
    /// Present when the phase polled the builder.
    pub build: Option<BuildStatus>,
}

/// What the reconciler observed before deciding a Rest-target step.
#[derive(Debug, Clone, Default)]
pub struct RestObserved {
    pub uninstall_unless_live: bool,
    pub last_phase_transition: Option<DateTime<Utc>>,
    /// Present when the phase enumerated workloads.
    pub workloads: Option<WorkloadsObserved>,
}

/// Shape of the labeled workload fleet during shutdown.
#[derive(Debug, Clone, Default)]
pub struct WorkloadsObserved {
    pub any_terminating: bool,
    /// Names of pods to delete (everything not already terminating).
    pub deletable: Vec<String>,
}

/// Side effect a step carries. Executed relative to the status write as
/// each executor requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Build and submit a workload manifest.
    StartWorkload,
    /// Record the built image into `spec.image` (retry-on-conflict).
    RecordBuiltImage(String),
    /// Abort the in-flight build and drop its context.
    CancelBuild,
    /// Delete the named workloads.
    DeleteWorkloads(Vec<String>),
}

/// One decided step of the phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStep {
    /// Nothing to do; wait for the next watch event.
    Wait,
    /// Persist a phase change, optionally clearing podName, optionally
    /// carrying an effect.
    Transit {
        phase: Phase,
        clear_pod_name: bool,
        effect: Option<Effect>,
        requeue: Requeue,
    },
    /// Persist Live tracking the given pod.
    GoLive { pod_name: String },
    /// Run an effect without a phase change.
    Act { effect: Effect, requeue: Requeue },
    /// Requeue without any change.
    Again(Requeue),
    /// Delete the CliApp record itself.
    Uninstall,
    /// Surface a failure into `status.error`; retried only on spec change.
    Fail(String),
}

impl PhaseStep {
    fn transit(phase: Phase, requeue: Requeue) -> Self {
        PhaseStep::Transit { phase, clear_pod_name: false, effect: None, requeue }
    }
}

/// Decide the next step toward `targetPhase: Live`.
pub fn decide_live(phase: Option<Phase>, obs: &LiveObserved) -> PhaseStep {
    match phase {
        Some(Phase::Building) => match &obs.build {
            Some(BuildStatus { done: false, .. }) | None => {
                PhaseStep::Again(Requeue::After(DEFAULT_REQUEUE))
            }
            Some(BuildStatus { done: true, error: Some(BuildError::Failed(reason)), .. }) => {
                PhaseStep::Fail(format!("image build failed: {reason}"))
            }
            Some(BuildStatus { done: true, error: Some(BuildError::UnderBuild), .. }) => {
                PhaseStep::Again(Requeue::After(DEFAULT_REQUEUE))
            }
            Some(BuildStatus { done: true, error: None, image }) => PhaseStep::Transit {
                phase: Phase::Recovering,
                clear_pod_name: false,
                effect: Some(Effect::RecordBuiltImage(image.clone())),
                requeue: Requeue::Immediate,
            },
        },

        Some(Phase::Live) => match obs.claim.as_ref() {
            Some(ClaimOutcome::Ready(pod)) => PhaseStep::GoLive { pod_name: pod.clone() },
            Some(ClaimOutcome::Starting(_)) => PhaseStep::Wait,
            Some(ClaimOutcome::NoCandidate) | None => PhaseStep::Transit {
                phase: Phase::Recovering,
                clear_pod_name: true,
                effect: None,
                requeue: Requeue::Immediate,
            },
        },

        Some(Phase::Recovering) => match obs.claim.as_ref() {
            Some(ClaimOutcome::Ready(pod)) => PhaseStep::GoLive { pod_name: pod.clone() },
            Some(ClaimOutcome::Starting(_)) => PhaseStep::Wait,
            Some(ClaimOutcome::NoCandidate) | None => {
                PhaseStep::Act { effect: Effect::StartWorkload, requeue: Requeue::Immediate }
            }
        },

        // Rest-like phases: head toward Recovering, detouring through a
        // build when there is no image yet.
        None | Some(Phase::Rest) | Some(Phase::ShuttingDown) | Some(Phase::WaitingForSessions) => {
            if obs.needs_build {
                if !obs.has_dockerfile {
                    return PhaseStep::Fail(
                        "specify either image or dockerfile for the app".to_string(),
                    );
                }
                if !obs.builder_configured {
                    return PhaseStep::Fail(
                        "unable to build image since no image builder installed".to_string(),
                    );
                }
                return PhaseStep::transit(Phase::Building, Requeue::After(DEFAULT_REQUEUE));
            }
            PhaseStep::transit(Phase::Recovering, Requeue::Immediate)
        }
    }
}

/// Decide the next step toward `targetPhase: Rest`.
pub fn decide_rest(
    phase: Option<Phase>,
    obs: &RestObserved,
    now: DateTime<Utc>,
    idle_live: Duration,
) -> PhaseStep {
    match phase {
        Some(Phase::Live) => {
            if obs.uninstall_unless_live {
                PhaseStep::Transit {
                    phase: Phase::ShuttingDown,
                    clear_pod_name: true,
                    effect: None,
                    requeue: Requeue::Immediate,
                }
            } else {
                PhaseStep::transit(Phase::WaitingForSessions, Requeue::After(idle_live))
            }
        }

        Some(Phase::WaitingForSessions) => {
            if let Some(remainder) = idle_remainder(obs.last_phase_transition, now, idle_live) {
                return PhaseStep::Again(Requeue::After(remainder));
            }
            PhaseStep::transit(Phase::ShuttingDown, Requeue::Immediate)
        }

        None | Some(Phase::Recovering) => {
            PhaseStep::transit(Phase::ShuttingDown, Requeue::Immediate)
        }

        Some(Phase::ShuttingDown) => {
            let Some(workloads) = obs.workloads.as_ref() else {
                return PhaseStep::Again(Requeue::After(DEFAULT_REQUEUE));
            };
            if workloads.deletable.is_empty() && !workloads.any_terminating {
                if obs.uninstall_unless_live {
                    return PhaseStep::Uninstall;
                }
                return PhaseStep::transit(Phase::Rest, Requeue::OnChange);
            }
            if workloads.any_terminating {
                return PhaseStep::Again(Requeue::After(DEFAULT_REQUEUE));
            }
            PhaseStep::Act {
                effect: Effect::DeleteWorkloads(workloads.deletable.clone()),
                requeue: Requeue::After(DEFAULT_REQUEUE),
            }
        }

        Some(Phase::Building) => PhaseStep::Transit {
            phase: Phase::ShuttingDown,
            clear_pod_name: false,
            effect: Some(Effect::CancelBuild),
            requeue: Requeue::Immediate,
        },

        // Already at the target.
        Some(Phase::Rest) => PhaseStep::Wait,
    }
}

/// Remaining idle window, or `None` once it has elapsed. A missing
/// transition timestamp counts as elapsed.
pub fn idle_remainder(
    last_transition: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    idle_live: Duration,
) -> Option<Duration> {
    let last = last_transition?;
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    if elapsed < idle_live {
        Some(idle_live - elapsed)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
