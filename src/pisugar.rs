//! PiSugar power manager client
//!
//! The PiSugar server speaks a line protocol over TCP: one command per
//! connection, one short text reply such as `battery: 85`.

use async_trait::async_trait;
use chrono::{Local, SecondsFormat, TimeDelta};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const PISUGAR_ADDR: &str = "127.0.0.1:8423";

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const REPLY_LIMIT: usize = 1024;

/// Repeat mask for the alarm: every day of the week
const EVERY_DAY: u8 = 127;

/// Wake alarm and battery status
#[async_trait]
pub trait Rtc: Send + Sync {
    /// Arm the wake alarm `minutes` from now. Returns whether it was accepted
    async fn set_wake_alarm(&self, minutes: u32) -> bool;

    /// Whether external power is plugged in
    async fn is_charging(&self) -> bool;

    /// Battery charge in percent, when readable
    async fn battery_level(&self) -> Option<f32>;
}

pub struct PiSugar {
    addr: String,
}

impl PiSugar {
    pub fn new() -> Self {
        Self::with_addr(PISUGAR_ADDR)
    }

    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Send one command and return the trimmed reply
    async fn command(&self, cmd: &str) -> Option<String> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(cmd.as_bytes()).await?;

            let mut buf = vec![0u8; REPLY_LIMIT];
            let n = stream.read(&mut buf).await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf[..n]).trim().to_string())
        };

        match tokio::time::timeout(REPLY_TIMEOUT, exchange).await {
            Ok(Ok(reply)) => {
                tracing::debug!("PiSugar `{}` -> `{}`", cmd, reply);
                Some(reply)
            }
            Ok(Err(e)) => {
                tracing::error!("PiSugar `{}` failed: {}", cmd, e);
                None
            }
            Err(_) => {
                tracing::error!("PiSugar `{}` timed out", cmd);
                None
            }
        }
    }
}

impl Default for PiSugar {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rtc for PiSugar {
    async fn set_wake_alarm(&self, minutes: u32) -> bool {
        let wake_at = Local::now() + TimeDelta::minutes(i64::from(minutes));
        let cmd = alarm_command(&wake_at.to_rfc3339_opts(SecondsFormat::Millis, false));

        match self.command(&cmd).await {
            Some(reply) if alarm_accepted(&reply) => {
                tracing::info!("RTC alarm set for {} ({} min)", wake_at, minutes);
                true
            }
            Some(reply) => {
                tracing::error!("RTC alarm rejected: {}", reply);
                false
            }
            None => false,
        }
    }

    async fn is_charging(&self) -> bool {
        self.command("get battery_power_plugged")
            .await
            .is_some_and(|reply| parse_plugged(&reply))
    }

    async fn battery_level(&self) -> Option<f32> {
        self.command("get battery")
            .await
            .and_then(|reply| parse_battery(&reply))
    }
}

/// Stand-in for development machines without a PiSugar
#[derive(Debug, Default)]
pub struct MockRtc;

#[async_trait]
impl Rtc for MockRtc {
    async fn set_wake_alarm(&self, minutes: u32) -> bool {
        tracing::info!("Mock RTC alarm in {} min", minutes);
        true
    }

    async fn is_charging(&self) -> bool {
        true
    }

    async fn battery_level(&self) -> Option<f32> {
        Some(85.0)
    }
}

/// Which RTC to talk to, from `FRAME_RTC` (pisugar | mock)
pub fn from_env() -> Box<dyn Rtc> {
    match std::env::var("FRAME_RTC").unwrap_or_default().as_str() {
        "pisugar" => Box::new(PiSugar::new()),
        _ => Box::new(MockRtc),
    }
}

fn alarm_command(iso_time: &str) -> String {
    format!("rtc_alarm_set {} {}", iso_time, EVERY_DAY)
}

fn alarm_accepted(reply: &str) -> bool {
    let reply = reply.to_ascii_lowercase();
    ["ok", "done", "success"].iter().any(|word| reply.contains(word))
}

/// `battery: 85.3` -> 85.3
fn parse_battery(reply: &str) -> Option<f32> {
    let (_, value) = reply.split_once(':')?;
    value.trim().parse().ok()
}

/// `battery_power_plugged: true`
fn parse_plugged(reply: &str) -> bool {
    reply.to_ascii_lowercase().contains("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Answers every connection with `reply`, recording the commands seen
    async fn fake_pisugar(reply: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; 1024];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                log.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).to_string());
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });

        (addr, seen)
    }

    #[test]
    fn test_parse_replies() {
        assert_eq!(parse_battery("battery: 85"), Some(85.0));
        assert_eq!(parse_battery("battery: 42.5\n"), Some(42.5));
        assert_eq!(parse_battery("error"), None);
        assert!(parse_plugged("battery_power_plugged: true"));
        assert!(!parse_plugged("battery_power_plugged: false"));
        assert!(alarm_accepted("rtc_alarm_set: done"));
        assert!(!alarm_accepted("Invalid request."));
    }

    #[test]
    fn test_alarm_command_format() {
        assert_eq!(
            alarm_command("2024-05-01T10:30:00.000+09:00"),
            "rtc_alarm_set 2024-05-01T10:30:00.000+09:00 127"
        );
    }

    #[tokio::test]
    async fn test_battery_level_over_tcp() {
        let (addr, seen) = fake_pisugar("battery: 77\n").await;
        let rtc = PiSugar::with_addr(addr);

        assert_eq!(rtc.battery_level().await, Some(77.0));
        assert_eq!(seen.lock().unwrap().as_slice(), ["get battery"]);
    }

    #[tokio::test]
    async fn test_wake_alarm_over_tcp() {
        let (addr, seen) = fake_pisugar("rtc_alarm_set: done\n").await;
        let rtc = PiSugar::with_addr(addr);

        assert!(rtc.set_wake_alarm(30).await);
        let commands = seen.lock().unwrap().clone();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("rtc_alarm_set "));
        assert!(commands[0].ends_with(" 127"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let rtc = PiSugar::with_addr(addr);
        assert!(!rtc.set_wake_alarm(5).await);
        assert!(!rtc.is_charging().await);
        assert_eq!(rtc.battery_level().await, None);
    }
}
