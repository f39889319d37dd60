use std::sync::{Arc, Weak};

use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::manager::E2eeSessionManager;

/// Background cleanup/rotation timers. Dropping the handle stops them; they
/// also stop on their own once the manager is dropped.
#[derive(Debug)]
pub struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    pub fn shutdown(self) {}
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub fn spawn_maintenance(manager: &Arc<E2eeSessionManager>) -> MaintenanceHandle {
    let config = manager.config().clone();
    let mut tasks = vec![spawn_timer(
        Arc::downgrade(manager),
        config.cleanup_interval(),
        "cleanup",
        |m| m.cleanup_expired_sessions(),
    )];
    if config.forward_secrecy {
        tasks.push(spawn_timer(
            Arc::downgrade(manager),
            config.rotation_interval(),
            "rotation",
            |m| m.rotate_expired_keys(),
        ));
    }
    MaintenanceHandle { tasks }
}

fn spawn_timer(
    manager: Weak<E2eeSessionManager>,
    period: Duration,
    name: &'static str,
    run: fn(&E2eeSessionManager) -> usize,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(manager) = manager.upgrade() else {
                debug!(target: "agora_e2ee", event = "maintenance_stopped", timer = name);
                break;
            };
            let affected = run(&manager);
            if affected > 0 {
                debug!(target: "agora_e2ee", event = "maintenance_tick", timer = name, affected);
            }
        }
    })
}
