// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The background stale sweep.

use std::ops::ControlFlow;
use std::time::Duration;

use futures::StreamExt;
use tick::{Clock, PeriodicTimer};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Owns the sweep task; dropping the handle stops the task.
#[derive(Debug)]
pub(crate) struct MaintenanceHandle {
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs `sweep` every `interval` until it breaks or the handle is dropped.
///
/// Returns `None` when called outside a tokio runtime.
pub(crate) fn start<F>(cache_name: &str, clock: &Clock, interval: Duration, mut sweep: F) -> Option<MaintenanceHandle>
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        tracing::warn!(cache.name = cache_name, "no tokio runtime available, background sweep disabled");
        return None;
    };

    let mut timer = PeriodicTimer::new(clock, interval);
    let task = runtime.spawn(async move {
        while timer.next().await.is_some() {
            if sweep().is_break() {
                break;
            }
        }
    });

    Some(MaintenanceHandle { task })
}
