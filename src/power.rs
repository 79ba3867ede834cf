//! Power cycle: wake, refresh, stay up for the runtime window, then arm the
//! RTC and shut down. Settings mode keeps the device awake for editing.

use crate::config::{ConfigStore, PowerMode, PowerSettings};
use crate::pisugar::Rtc;
use crate::scheduler::{RefreshOutcome, RefreshScheduler};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, Timelike};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PowerError {
    #[error("Failed to run shutdown: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Shutdown exited with {0}")]
    Exit(std::process::ExitStatus),
}

/// Hours of the day the frame may wake in. `start == end` means always;
/// `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start: u32,
    pub end: u32,
}

impl ActiveWindow {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: start % 24,
            end: end % 24,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        let hour = hour % 24;
        if self.start == self.end {
            true
        } else if self.start < self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

impl From<&PowerSettings> for ActiveWindow {
    fn from(settings: &PowerSettings) -> Self {
        Self::new(settings.active_start_hour, settings.active_end_hour)
    }
}

/// Next wake instant: one interval from now, pushed to the start of the
/// active window when that lands in quiet hours. Always after `now`.
pub fn next_wake(now: NaiveDateTime, interval_min: u32, window: ActiveWindow) -> NaiveDateTime {
    let next = now + ChronoDuration::minutes(i64::from(interval_min.max(1)));
    if window.contains(next.hour()) {
        return next;
    }

    let start = NaiveTime::from_hms_opt(window.start, 0, 0).unwrap_or_default();
    let mut target = next.date().and_time(start);
    if target <= next {
        target += ChronoDuration::days(1);
    }
    if target <= now {
        target += ChronoDuration::days(1);
    }
    target
}

/// Alarm offset in whole minutes, never less than one
pub fn alarm_minutes(now: NaiveDateTime, wake_at: NaiveDateTime) -> u32 {
    let seconds = (wake_at - now).num_seconds().max(0) as f64;
    ((seconds / 60.0).round() as u32).max(1)
}

#[async_trait]
pub trait SystemPower: Send + Sync {
    async fn shutdown(&self) -> Result<(), PowerError>;
}

/// Runs `sudo shutdown now`
#[derive(Debug, Default)]
pub struct ShutdownCommand;

#[async_trait]
impl SystemPower for ShutdownCommand {
    async fn shutdown(&self) -> Result<(), PowerError> {
        tracing::warn!("Shutting down now");
        let status = tokio::process::Command::new("sudo")
            .args(["shutdown", "now"])
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(PowerError::Exit(status))
        }
    }
}

/// Logs instead of powering off
#[derive(Debug, Default)]
pub struct NoopPower;

#[async_trait]
impl SystemPower for NoopPower {
    async fn shutdown(&self) -> Result<(), PowerError> {
        tracing::info!("Shutdown requested (noop)");
        Ok(())
    }
}

/// From `FRAME_POWER` (system | noop), defaulting to noop
pub fn from_env() -> Box<dyn SystemPower> {
    match std::env::var("FRAME_POWER").unwrap_or_default().as_str() {
        "system" => Box::new(ShutdownCommand),
        _ => Box::new(NoopPower),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Settings mode: the device stays up
    StayAwake,
    /// Mode was switched to settings during the runtime window
    ShutdownAborted,
    /// Operation mode on a charger: the device stays up and serves the admin
    /// surface instead of sleeping
    OnExternalPower,
    ShuttingDown {
        wake_at: NaiveDateTime,
        alarm_minutes: u32,
    },
}

pub struct PowerCycleManager {
    store: Arc<ConfigStore>,
    scheduler: Arc<RefreshScheduler>,
    rtc: Arc<dyn Rtc>,
    power: Arc<dyn SystemPower>,
    clock: fn() -> NaiveDateTime,
}

impl PowerCycleManager {
    pub fn new(
        store: Arc<ConfigStore>,
        scheduler: Arc<RefreshScheduler>,
        rtc: Arc<dyn Rtc>,
        power: Arc<dyn SystemPower>,
        clock: fn() -> NaiveDateTime,
    ) -> Self {
        Self {
            store,
            scheduler,
            rtc,
            power,
            clock,
        }
    }

    /// One wake cycle
    pub async fn run_cycle(&self, refresh_requested: bool) -> CycleOutcome {
        let charging = self.log_battery().await;

        let config = self.store.load().await;
        tracing::info!("Power mode: {}", config.power.mode);

        if config.power.mode == PowerMode::Settings {
            if refresh_requested {
                self.refresh().await;
            }
            return CycleOutcome::StayAwake;
        }

        self.refresh().await;

        if charging {
            tracing::info!("External power connected, staying up");
            return CycleOutcome::OnExternalPower;
        }

        let runtime = config.power.runtime();
        tracing::info!("Staying up for {:?} before shutdown", runtime);
        tokio::time::sleep(runtime).await;

        // an admin may have switched modes meanwhile
        let config = match self.store.try_load().await {
            Ok(latest) if latest.power.mode == PowerMode::Settings => {
                tracing::info!("Switched to settings mode, shutdown aborted");
                return CycleOutcome::ShutdownAborted;
            }
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!("Config unreadable before shutdown ({}), keeping cycle settings", e);
                config
            }
        };

        let now = (self.clock)();
        let wake_at = next_wake(now, config.power.interval_min, ActiveWindow::from(&config.power));
        let minutes = alarm_minutes(now, wake_at);
        tracing::info!("Next wake at {} ({} min)", wake_at, minutes);

        if !self.rtc.set_wake_alarm(minutes).await {
            tracing::error!("Failed to arm RTC alarm, shutting down anyway");
        }

        if let Err(e) = self.power.shutdown().await {
            tracing::error!("Shutdown failed: {}", e);
        }

        CycleOutcome::ShuttingDown {
            wake_at,
            alarm_minutes: minutes,
        }
    }

    async fn refresh(&self) -> RefreshOutcome {
        let outcome = self.scheduler.refresh_display().await;
        tracing::info!("Refresh finished: {:?}", outcome);
        outcome
    }

    /// Log the battery state; returns whether external power is plugged in
    async fn log_battery(&self) -> bool {
        let level = self.rtc.battery_level().await;
        let charging = self.rtc.is_charging().await;
        match level {
            Some(level) => tracing::info!("Battery {:.0}% (charging: {})", level, charging),
            None => tracing::warn!("Battery level unavailable (charging: {})", charging),
        }
        charging
    }
}
