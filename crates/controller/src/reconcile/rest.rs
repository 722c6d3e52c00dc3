// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driving an app toward Rest: idle timing, workload teardown, uninstall.

use cliapp_api::{CliApp, Clock, Phase};
use kube::runtime::controller::Action;
use kube::Resource;

use super::decision::{decide_rest, RestObserved, WorkloadsObserved};
use super::{execute_step, list_workloads, Ctx, ReconcileError};

pub(crate) async fn make_app_rest<C: Clock>(
    app: &CliApp,
    ctx: &Ctx<C>,
) -> Result<Action, ReconcileError> {
    let name = app.meta().name.clone().unwrap_or_default();
    let namespace = app.meta().namespace.clone().unwrap_or_default();
    let phase = app.status.as_ref().and_then(|s| s.phase);

    let mut obs = RestObserved {
        uninstall_unless_live: app.spec.uninstall_unless_live,
        last_phase_transition: app
            .status
            .as_ref()
            .and_then(|s| s.last_phase_transition.as_ref())
            .map(|t| t.0),
        workloads: None,
    };

    if phase == Some(Phase::ShuttingDown) {
        let pods = list_workloads(ctx, &namespace, &name).await?;
        let any_terminating = pods.iter().any(|p| p.metadata.deletion_timestamp.is_some());
        let deletable = pods
            .iter()
            .filter(|p| p.metadata.deletion_timestamp.is_none())
            .filter_map(|p| p.metadata.name.clone())
            .collect();
        obs.workloads = Some(WorkloadsObserved { any_terminating, deletable });
    }

    let step = decide_rest(phase, &obs, ctx.clock.now(), ctx.config.idle_live());
    execute_step(step, app, ctx).await
}
