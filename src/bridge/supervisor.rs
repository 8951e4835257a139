//! Connection supervision
//!
//! Unattended installation: runtime connectivity loss retries forever,
//! with nothing but logs as an escalation path. The surface is checked
//! often (its USB link is the flaky one); the console check is slow and
//! doubles as the lighting fail-safe trigger.

use super::Bridge;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

impl Bridge {
    /// Run both transport checks until shutdown.
    pub async fn run_supervisor(self: std::sync::Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Connection supervisor started");
        let period = self.config.sync.surface_check_interval();
        let mut surface_check =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let period = self.config.sync.console_check_interval();
        let mut console_check =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = surface_check.tick() => self.check_surface().await,
                _ = console_check.tick() => self.check_console().await,
                _ = shutdown.changed() => {
                    info!("Connection supervisor stopped");
                    return;
                }
            }
        }
    }

    /// Reconnect the surface when its liveness window expires.
    pub async fn check_surface(&self) {
        if self.surface.is_connected() {
            self.reconnect_failures.store(0, Ordering::Relaxed);
            return;
        }

        warn!("Surface not responding");
        if self.surface.reconnect().await {
            self.reconnect_failures.store(0, Ordering::Relaxed);
            // The display contents died with the old connection
            let current = self.current_page();
            self.full_refresh(current).await;
        } else {
            let attempts = self.reconnect_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if attempts >= self.config.sync.max_reconnect_attempts {
                error!("Surface reconnect failed {attempts} times, still retrying");
                self.reconnect_failures.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Periodic console reachability check with lighting fail-safe.
    pub async fn check_console(&self) {
        debug!("Periodic console connectivity check");
        if self.console.check_connection().await {
            return;
        }

        warn!("Console unreachable, blacking out lighting as fail-safe");
        self.lights.blackout();
        if !self.lights.reopen().await {
            warn!("Lighting link reopen failed");
        }
    }
}
