//! Autocontrol sweeper: a background thread that reconciles MCIS records
//! whose `targetStatus` differs from the observed aggregate, re-issuing the
//! matching action a bounded number of times.

use crate::constants::AUTOCONTROL_MAX_ATTEMPTS;
use crate::context::Context;
use crate::mcis::control::control_mcis;
use crate::mcis::status::mcis_status_from_store;
use crate::models::mcis::{ControlAction, McisStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct AutoControl {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AutoControl {
    /// Starts the sweeper. The interval is re-read from the settings mirror
    /// on every cycle, so `AUTOCONTROL_DURATION_MS` updates apply live.
    pub fn spawn(ctx: Context) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("mcis-autocontrol".to_string())
            .spawn(move || {
                let mut attempts: HashMap<(String, String), u32> = HashMap::new();
                while !stop_flag.load(Ordering::SeqCst) {
                    let interval = ctx.settings().autocontrol_duration();
                    sleep_interruptible(&stop_flag, interval);
                    if stop_flag.load(Ordering::SeqCst) {
                        break;
                    }
                    sweep(&ctx, &mut attempts);
                }
            })
            .ok();

        AutoControl { stop, handle }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutoControl {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn sleep_interruptible(stop: &AtomicBool, interval: Duration) {
    let started = Instant::now();
    while started.elapsed() < interval {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(Duration::from_millis(100).min(interval));
    }
}

fn reconcile_action(target: McisStatus) -> Option<ControlAction> {
    match target {
        McisStatus::Running => Some(ControlAction::Resume),
        McisStatus::Suspended => Some(ControlAction::Suspend),
        McisStatus::Terminated => Some(ControlAction::Terminate),
        _ => None,
    }
}

fn sweep(ctx: &Context, attempts: &mut HashMap<(String, String), u32>) {
    let namespaces = match crate::namespace::list_ns(ctx) {
        Ok(namespaces) => namespaces,
        Err(e) => {
            warn!("autocontrol cannot list namespaces: {e}");
            return;
        }
    };

    for ns in namespaces {
        let mcis_ids = match crate::mcis::list_mcis_ids(ctx, &ns.id) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("autocontrol cannot list MCIS in `{}`: {e}", ns.id);
                continue;
            }
        };

        for mcis_id in mcis_ids {
            let mcis = match mcis_status_from_store(ctx, &ns.id, &mcis_id) {
                Ok(mcis) => mcis,
                Err(e) => {
                    warn!("autocontrol cannot read MCIS `{mcis_id}`: {e}");
                    continue;
                }
            };

            if mcis.status.is_in_progress() || mcis.status == mcis.target_status {
                attempts.remove(&(ns.id.clone(), mcis_id.clone()));
                continue;
            }
            let Some(action) = reconcile_action(mcis.target_status) else {
                continue;
            };

            let tries = attempts.entry((ns.id.clone(), mcis_id.clone())).or_insert(0);
            if *tries >= AUTOCONTROL_MAX_ATTEMPTS {
                continue;
            }
            *tries += 1;

            info!("autocontrol re-issuing {action} on MCIS `{mcis_id}` (attempt {tries})");
            match control_mcis(ctx, &ns.id, &mcis_id, action) {
                Ok(_) => {}
                Err(crate::errors::OrchestratorError::Busy { .. }) => {
                    // another action is in flight; try again next cycle
                }
                Err(e) => warn!("autocontrol {action} on MCIS `{mcis_id}` failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_action_mapping() {
        // execute & verify:
        assert_eq!(Some(ControlAction::Resume), reconcile_action(McisStatus::Running));
        assert_eq!(Some(ControlAction::Suspend), reconcile_action(McisStatus::Suspended));
        assert_eq!(Some(ControlAction::Terminate), reconcile_action(McisStatus::Terminated));
        assert_eq!(None, reconcile_action(McisStatus::Undefined));
        assert_eq!(None, reconcile_action(McisStatus::PartialFailed));
    }
}
