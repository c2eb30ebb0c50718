//! Application-level keep-alive
//!
//! The driver polls [`Heartbeat::tick`] inside its select loop, so the ping
//! shares the connection's write half instead of needing a side channel.
//! Without a configured interval the tick never completes.

use crate::traits::WsMessage;
use std::future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub struct Heartbeat {
    ticker: Option<Interval>,
    payload: Option<WsMessage>,
}

impl Heartbeat {
    /// Start a heartbeat for one connection session
    ///
    /// The first ping fires one full interval after the session opens.
    pub fn new(config: Option<&(Duration, WsMessage)>) -> Self {
        match config {
            Some((interval, payload)) if !interval.is_zero() => {
                let mut ticker = interval_at(Instant::now() + *interval, *interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Self {
                    ticker: Some(ticker),
                    payload: Some(payload.clone()),
                }
            }
            _ => Self {
                ticker: None,
                payload: None,
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ticker.is_some()
    }

    /// Wait for the next ping and return its payload
    pub async fn tick(&mut self) -> WsMessage {
        match (self.ticker.as_mut(), self.payload.as_ref()) {
            (Some(ticker), Some(payload)) => {
                ticker.tick().await;
                payload.clone()
            }
            _ => future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heartbeat_emits_payload_after_interval() {
        let config = (Duration::from_millis(20), WsMessage::Text("ping".into()));
        let mut heartbeat = Heartbeat::new(Some(&config));
        assert!(heartbeat.is_enabled());

        let started = Instant::now();
        let payload = heartbeat.tick().await;
        assert_eq!(payload, WsMessage::Text("ping".into()));
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_disabled_heartbeat_never_ticks() {
        let mut heartbeat = Heartbeat::new(None);
        assert!(!heartbeat.is_enabled());

        let result = tokio::time::timeout(Duration::from_millis(30), heartbeat.tick()).await;
        assert!(result.is_err());
    }
}
