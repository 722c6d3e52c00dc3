// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::{Duration as Span, Utc};

use super::*;
use crate::build::{BuildError, BuildStatus};

const IDLE: Duration = Duration::from_secs(10);

fn image_obs() -> LiveObserved {
    LiveObserved { builder_configured: true, ..Default::default() }
}

fn build_obs() -> LiveObserved {
    LiveObserved {
        needs_build: true,
        has_dockerfile: true,
        builder_configured: true,
        ..Default::default()
    }
}

fn with_claim(mut obs: LiveObserved, claim: ClaimOutcome) -> LiveObserved {
    obs.claim = Some(claim);
    obs
}

#[test]
fn cold_start_heads_to_recovering() {
    let step = decide_live(None, &image_obs());
    assert_eq!(
        step,
        PhaseStep::Transit {
            phase: Phase::Recovering,
            clear_pod_name: false,
            effect: None,
            requeue: Requeue::Immediate,
        }
    );
}

#[test]
fn rest_like_phases_head_to_recovering() {
    for phase in [Phase::Rest, Phase::ShuttingDown, Phase::WaitingForSessions] {
        let step = decide_live(Some(phase), &image_obs());
        assert!(
            matches!(step, PhaseStep::Transit { phase: Phase::Recovering, .. }),
            "phase {phase} took {step:?}"
        );
    }
}

#[test]
fn missing_image_without_dockerfile_fails() {
    let obs = LiveObserved { needs_build: true, builder_configured: true, ..Default::default() };
    let step = decide_live(None, &obs);
    let PhaseStep::Fail(message) = step else { panic!("expected failure, got {step:?}") };
    assert!(message.contains("image or dockerfile"));
}

#[test]
fn missing_builder_fails_with_builder_message() {
    let obs = LiveObserved { needs_build: true, has_dockerfile: true, ..Default::default() };
    let step = decide_live(None, &obs);
    let PhaseStep::Fail(message) = step else { panic!("expected failure, got {step:?}") };
    assert!(message.contains("no image builder"));
}

#[test]
fn dockerfile_app_enters_building() {
    let step = decide_live(None, &build_obs());
    assert_eq!(
        step,
        PhaseStep::Transit {
            phase: Phase::Building,
            clear_pod_name: false,
            effect: None,
            requeue: Requeue::After(DEFAULT_REQUEUE),
        }
    );
}

#[test]
fn recovering_with_ready_pod_goes_live() {
    let obs = with_claim(image_obs(), ClaimOutcome::Ready("kubectl-a1b2c".to_string()));
    assert_eq!(
        decide_live(Some(Phase::Recovering), &obs),
        PhaseStep::GoLive { pod_name: "kubectl-a1b2c".to_string() }
    );
}

#[test]
fn recovering_with_starting_pod_waits_for_watch() {
    let obs = with_claim(image_obs(), ClaimOutcome::Starting("kubectl-a1b2c".to_string()));
    assert_eq!(decide_live(Some(Phase::Recovering), &obs), PhaseStep::Wait);
}

#[test]
fn recovering_without_candidate_starts_workload() {
    let obs = with_claim(image_obs(), ClaimOutcome::NoCandidate);
    assert_eq!(
        decide_live(Some(Phase::Recovering), &obs),
        PhaseStep::Act { effect: Effect::StartWorkload, requeue: Requeue::Immediate }
    );
}

#[test]
fn live_keeps_tracking_the_ready_pod() {
    let obs = with_claim(image_obs(), ClaimOutcome::Ready("kubectl-a1b2c".to_string()));
    assert_eq!(
        decide_live(Some(Phase::Live), &obs),
        PhaseStep::GoLive { pod_name: "kubectl-a1b2c".to_string() }
    );
}

#[test]
fn live_without_candidate_falls_back_to_recovering() {
    // A spec edit invalidates the running pod: clear podName, recover.
    let obs = with_claim(image_obs(), ClaimOutcome::NoCandidate);
    assert_eq!(
        decide_live(Some(Phase::Live), &obs),
        PhaseStep::Transit {
            phase: Phase::Recovering,
            clear_pod_name: true,
            effect: None,
            requeue: Requeue::Immediate,
        }
    );
}

#[test]
fn building_polls_until_done() {
    let mut obs = build_obs();
    obs.build = Some(BuildStatus {
        image: "docker.io/cliapp/curl:built".to_string(),
        error: Some(BuildError::UnderBuild),
        done: false,
    });
    assert_eq!(
        decide_live(Some(Phase::Building), &obs),
        PhaseStep::Again(Requeue::After(DEFAULT_REQUEUE))
    );
}

#[test]
fn finished_build_records_image_and_recovers() {
    let mut obs = build_obs();
    obs.build = Some(BuildStatus {
        image: "docker.io/cliapp/curl:built".to_string(),
        error: None,
        done: true,
    });
    assert_eq!(
        decide_live(Some(Phase::Building), &obs),
        PhaseStep::Transit {
            phase: Phase::Recovering,
            clear_pod_name: false,
            effect: Some(Effect::RecordBuiltImage("docker.io/cliapp/curl:built".to_string())),
            requeue: Requeue::Immediate,
        }
    );
}

#[test]
fn failed_build_surfaces_the_reason() {
    let mut obs = build_obs();
    obs.build = Some(BuildStatus {
        image: "docker.io/cliapp/curl:built".to_string(),
        error: Some(BuildError::Failed("frontend rejected dockerfile".to_string())),
        done: true,
    });
    let step = decide_live(Some(Phase::Building), &obs);
    let PhaseStep::Fail(message) = step else { panic!("expected failure, got {step:?}") };
    assert!(message.contains("frontend rejected dockerfile"));
}

// --- Rest target ---

fn rest_obs() -> RestObserved {
    RestObserved::default()
}

#[test]
fn live_idles_before_shutdown() {
    let step = decide_rest(Some(Phase::Live), &rest_obs(), Utc::now(), IDLE);
    assert_eq!(
        step,
        PhaseStep::Transit {
            phase: Phase::WaitingForSessions,
            clear_pod_name: false,
            effect: None,
            requeue: Requeue::After(IDLE),
        }
    );
}

#[test]
fn uninstalling_app_skips_the_idle_window() {
    let obs = RestObserved { uninstall_unless_live: true, ..rest_obs() };
    let step = decide_rest(Some(Phase::Live), &obs, Utc::now(), IDLE);
    assert_eq!(
        step,
        PhaseStep::Transit {
            phase: Phase::ShuttingDown,
            clear_pod_name: true,
            effect: None,
            requeue: Requeue::Immediate,
        }
    );
}

#[test]
fn idle_window_requeues_for_the_remainder() {
    let now = Utc::now();
    let obs = RestObserved {
        last_phase_transition: Some(now - Span::seconds(4)),
        ..rest_obs()
    };
    let step = decide_rest(Some(Phase::WaitingForSessions), &obs, now, IDLE);
    assert_eq!(step, PhaseStep::Again(Requeue::After(Duration::from_secs(6))));
}

#[test]
fn elapsed_idle_window_shuts_down() {
    let now = Utc::now();
    let obs = RestObserved {
        last_phase_transition: Some(now - Span::seconds(11)),
        ..rest_obs()
    };
    let step = decide_rest(Some(Phase::WaitingForSessions), &obs, now, IDLE);
    assert!(matches!(step, PhaseStep::Transit { phase: Phase::ShuttingDown, .. }));
}

#[test]
fn unset_and_recovering_phases_shut_down() {
    for phase in [None, Some(Phase::Recovering)] {
        let step = decide_rest(phase, &rest_obs(), Utc::now(), IDLE);
        assert!(matches!(step, PhaseStep::Transit { phase: Phase::ShuttingDown, .. }));
    }
}

#[test]
fn empty_fleet_reaches_rest() {
    let obs = RestObserved {
        workloads: Some(WorkloadsObserved::default()),
        ..rest_obs()
    };
    let step = decide_rest(Some(Phase::ShuttingDown), &obs, Utc::now(), IDLE);
    assert_eq!(
        step,
        PhaseStep::Transit {
            phase: Phase::Rest,
            clear_pod_name: false,
            effect: None,
            requeue: Requeue::OnChange,
        }
    );
}

#[test]
fn empty_fleet_with_uninstall_deletes_the_record() {
    let obs = RestObserved {
        uninstall_unless_live: true,
        workloads: Some(WorkloadsObserved::default()),
        ..rest_obs()
    };
    assert_eq!(
        decide_rest(Some(Phase::ShuttingDown), &obs, Utc::now(), IDLE),
        PhaseStep::Uninstall
    );
}

#[test]
fn terminating_pods_only_requeue() {
    let obs = RestObserved {
        workloads: Some(WorkloadsObserved { any_terminating: true, deletable: vec![] }),
        ..rest_obs()
    };
    assert_eq!(
        decide_rest(Some(Phase::ShuttingDown), &obs, Utc::now(), IDLE),
        PhaseStep::Again(Requeue::After(DEFAULT_REQUEUE))
    );
}

#[test]
fn running_pods_get_deleted() {
    let obs = RestObserved {
        workloads: Some(WorkloadsObserved {
            any_terminating: false,
            deletable: vec!["kubectl-a1b2c".to_string(), "kubectl-x9y8z".to_string()],
        }),
        ..rest_obs()
    };
    assert_eq!(
        decide_rest(Some(Phase::ShuttingDown), &obs, Utc::now(), IDLE),
        PhaseStep::Act {
            effect: Effect::DeleteWorkloads(vec![
                "kubectl-a1b2c".to_string(),
                "kubectl-x9y8z".to_string()
            ]),
            requeue: Requeue::After(DEFAULT_REQUEUE),
        }
    );
}

#[test]
fn building_app_cancels_build_on_rest() {
    let step = decide_rest(Some(Phase::Building), &rest_obs(), Utc::now(), IDLE);
    assert_eq!(
        step,
        PhaseStep::Transit {
            phase: Phase::ShuttingDown,
            clear_pod_name: false,
            effect: Some(Effect::CancelBuild),
            requeue: Requeue::Immediate,
        }
    );
}

#[test]
fn rest_at_rest_is_a_no_op() {
    assert_eq!(decide_rest(Some(Phase::Rest), &rest_obs(), Utc::now(), IDLE), PhaseStep::Wait);
}

#[test]
fn idle_remainder_counts_down() {
    let now = Utc::now();
    assert_eq!(
        idle_remainder(Some(now - Span::seconds(3)), now, IDLE),
        Some(Duration::from_secs(7))
    );
    assert_eq!(idle_remainder(Some(now - Span::seconds(10)), now, IDLE), None);
    assert_eq!(idle_remainder(None, now, IDLE), None);
}

/// Cold start, the Live half of the round-trip law: the decided phases walk
/// unset → Recovering → Live without detours.
#[test]
fn cold_start_trace_reaches_live() {
    let mut phase = None;

    let step = decide_live(phase, &image_obs());
    let PhaseStep::Transit { phase: next, .. } = step else { panic!("{step:?}") };
    phase = Some(next);
    assert_eq!(phase, Some(Phase::Recovering));

    // No pods yet: the reconciler starts one.
    let step = decide_live(phase, &with_claim(image_obs(), ClaimOutcome::NoCandidate));
    assert_eq!(step, PhaseStep::Act { effect: Effect::StartWorkload, requeue: Requeue::Immediate });

    // The pod boots...
    let step =
        decide_live(phase, &with_claim(image_obs(), ClaimOutcome::Starting("kubectl-a1b2c".into())));
    assert_eq!(step, PhaseStep::Wait);

    // ...and reports ready.
    let step =
        decide_live(phase, &with_claim(image_obs(), ClaimOutcome::Ready("kubectl-a1b2c".into())));
    assert_eq!(step, PhaseStep::GoLive { pod_name: "kubectl-a1b2c".to_string() });
}

/// Idle shutdown, the Rest half of the round-trip law: Live →
/// WaitingForSessions → ShuttingDown → Rest with the fleet drained.
#[test]
fn idle_shutdown_trace_reaches_rest() {
    let start = Utc::now();
    let mut phase = Some(Phase::Live);

    let step = decide_rest(phase, &rest_obs(), start, IDLE);
    let PhaseStep::Transit { phase: next, requeue, .. } = step else { panic!("{step:?}") };
    phase = Some(next);
    assert_eq!(phase, Some(Phase::WaitingForSessions));
    assert_eq!(requeue, Requeue::After(IDLE));

    // The idle window passes without new sessions.
    let obs = RestObserved { last_phase_transition: Some(start), ..rest_obs() };
    let step = decide_rest(phase, &obs, start + Span::seconds(11), IDLE);
    let PhaseStep::Transit { phase: next, .. } = step else { panic!("{step:?}") };
    phase = Some(next);
    assert_eq!(phase, Some(Phase::ShuttingDown));

    // One pod still running: delete it.
    let obs = RestObserved {
        workloads: Some(WorkloadsObserved {
            any_terminating: false,
            deletable: vec!["kubectl-a1b2c".to_string()],
        }),
        ..rest_obs()
    };
    let step = decide_rest(phase, &obs, start + Span::seconds(12), IDLE);
    assert!(matches!(step, PhaseStep::Act { effect: Effect::DeleteWorkloads(_), .. }));

    // Fleet drained: Rest.
    let obs = RestObserved { workloads: Some(WorkloadsObserved::default()), ..rest_obs() };
    let step = decide_rest(phase, &obs, start + Span::seconds(20), IDLE);
    assert!(matches!(step, PhaseStep::Transit { phase: Phase::Rest, .. }));
}

/// Every path out of Live for an uninstall-unless-live app ends in record
/// deletion (or back at Live).
#[test]
fn uninstall_paths_reach_deletion() {
    let obs = RestObserved { uninstall_unless_live: true, ..rest_obs() };
    let step = decide_rest(Some(Phase::Live), &obs, Utc::now(), IDLE);
    let PhaseStep::Transit { phase: next, .. } = step else { panic!("{step:?}") };
    assert_eq!(next, Phase::ShuttingDown);

    let obs = RestObserved {
        uninstall_unless_live: true,
        workloads: Some(WorkloadsObserved::default()),
        ..rest_obs()
    };
    assert_eq!(decide_rest(Some(next), &obs, Utc::now(), IDLE), PhaseStep::Uninstall);
}
