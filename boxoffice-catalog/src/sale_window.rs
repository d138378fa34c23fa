use std::sync::Arc;

use boxoffice_core::Clock;
use boxoffice_shared::models::events::SaleWindowChangedEvent;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ticket::Event;

/// Where an event's ticket sale stands. Variants are ordered the way time
/// moves them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleWindowState {
    Waiting,
    Open,
    Ended,
}

impl SaleWindowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleWindowState::Waiting => "WAITING",
            SaleWindowState::Open => "OPEN",
            SaleWindowState::Ended => "ENDED",
        }
    }
}

pub fn compute_state(
    now: DateTime<Utc>,
    sale_start: DateTime<Utc>,
    sale_end: Option<DateTime<Utc>>,
) -> SaleWindowState {
    if now < sale_start {
        return SaleWindowState::Waiting;
    }
    match sale_end {
        Some(end) if now > end => SaleWindowState::Ended,
        _ => SaleWindowState::Open,
    }
}

/// Last computed sale state of one event plus the bounds it is derived from.
#[derive(Debug, Clone)]
pub struct SaleWindow {
    event_id: Uuid,
    sale_start: DateTime<Utc>,
    sale_end: Option<DateTime<Utc>>,
    state: SaleWindowState,
}

impl SaleWindow {
    /// Starts in whatever state `now` dictates, so a sale that has already
    /// opened never reports WAITING first.
    pub fn new(
        event_id: Uuid,
        sale_start: DateTime<Utc>,
        sale_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            sale_start,
            sale_end,
            state: compute_state(now, sale_start, sale_end),
        }
    }

    pub fn for_event(event: &Event, now: DateTime<Utc>) -> Self {
        Self::new(event.id, event.sale_start_time, event.sale_end_time, now)
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn state(&self) -> SaleWindowState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SaleWindowState::Ended
    }

    /// Recompute from `now`. Returns the change notification when the state
    /// moved. A clock that jumps backwards never moves the state back.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<SaleWindowChangedEvent> {
        let computed = compute_state(now, self.sale_start, self.sale_end);
        if computed <= self.state {
            return None;
        }

        let previous = self.state;
        self.state = computed;
        info!(
            "Sale window for event {} moved {} -> {}",
            self.event_id,
            previous.as_str(),
            computed.as_str()
        );

        Some(SaleWindowChangedEvent {
            event_id: self.event_id,
            previous: previous.as_str().to_string(),
            current: computed.as_str().to_string(),
            timestamp: now.timestamp(),
        })
    }

    pub fn time_until_open(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.state != SaleWindowState::Waiting || now >= self.sale_start {
            return None;
        }
        Some(self.sale_start - now)
    }

    pub fn time_until_close(&self, now: DateTime<Utc>) -> Option<Duration> {
        let end = self.sale_end?;
        if self.state == SaleWindowState::Ended || now > end {
            return None;
        }
        Some(end - now)
    }

    /// Re-evaluate every `period` until the window ends.
    pub fn spawn_ticker(self, clock: Arc<dyn Clock>, period: std::time::Duration) -> SaleWindowHandle {
        let (state_tx, state_rx) = watch::channel(self.state);
        let (events_tx, _) = broadcast::channel(16);
        let events = events_tx.clone();
        let mut window = self;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            while !window.is_terminal() {
                interval.tick().await;
                if let Some(event) = window.tick(clock.now()) {
                    state_tx.send_replace(window.state());
                    // No subscribers is fine; the watch channel still holds the state.
                    let _ = events_tx.send(event);
                }
            }
            debug!("Sale window ticker for event {} stopped", window.event_id());
        });

        SaleWindowHandle {
            state: state_rx,
            events,
            task,
        }
    }
}

/// Running ticker for one event. Dropping it stops the ticker.
pub struct SaleWindowHandle {
    state: watch::Receiver<SaleWindowState>,
    events: broadcast::Sender<SaleWindowChangedEvent>,
    task: JoinHandle<()>,
}

impl SaleWindowHandle {
    pub fn current(&self) -> SaleWindowState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaleWindowChangedEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<SaleWindowState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SaleWindowHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
