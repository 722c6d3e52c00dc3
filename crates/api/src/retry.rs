// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict-retrying spec updates.
//!
//! Both writers of CliApp specs (the gate flipping `targetPhase`, the
//! controller recording a built image) race with each other and with users
//! editing the record. Updates go through a short get-mutate-replace loop
//! that retries only on 409 Conflict.

use std::time::Duration;

use kube::api::{Api, PostParams};

use crate::CliApp;

const RETRY_ATTEMPTS: usize = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Get `name`, apply `mutate`, and replace, retrying on write conflicts.
///
/// `mutate` returns false to signal the record already has the desired
/// shape; the fetched record is returned unchanged without a write.
pub async fn update_spec_with_retry<F>(
    api: &Api<CliApp>,
    name: &str,
    mutate: F,
) -> Result<CliApp, kube::Error>
where
    F: Fn(&mut CliApp) -> bool,
{
    let mut attempt = 0;
    loop {
        let mut app = api.get(name).await?;
        if !mutate(&mut app) {
            return Ok(app);
        }

        // Replace rejects stale managedFields
        app.metadata.managed_fields = None;

        match api.replace(name, &PostParams::default(), &app).await {
            Ok(updated) => return Ok(updated),
            Err(kube::Error::Api(resp)) if resp.code == 409 && attempt < RETRY_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(err) => return Err(err),
        }
    }
}
