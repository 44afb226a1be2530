use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::models::events::{ChangeEvent, EntityKind};

const DEFAULT_CAPACITY: usize = 256;

/// What a subscriber sees next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotice {
    Changed(ChangeEvent),
    /// Events were dropped; the subscriber must refetch everything it shows.
    Resync,
}

/// In-process fan-out of committed queue changes.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        ChangeBus { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        if self.sender.send(event).is_err() {
            debug!("No subscribers for queue change");
        }
    }

    /// Subscribes to every entity kind.
    pub fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription {
            receiver: self.sender.subscribe(),
            entity: None,
            station_user_id: None,
        }
    }

    pub fn subscribe_to(&self, entity: EntityKind) -> ChangeSubscription {
        ChangeSubscription {
            entity: Some(entity),
            ..self.subscribe()
        }
    }

    /// Subscribes to every change at one station.
    pub fn subscribe_station(&self, station_user_id: &str) -> ChangeSubscription {
        ChangeSubscription {
            station_user_id: Some(station_user_id.to_string()),
            ..self.subscribe()
        }
    }
}

#[derive(Debug)]
pub struct ChangeSubscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    entity: Option<EntityKind>,
    station_user_id: Option<String>,
}

impl ChangeSubscription {
    fn wants(&self, event: &ChangeEvent) -> bool {
        self.entity.map_or(true, |entity| entity == event.entity)
            && self
                .station_user_id
                .as_deref()
                .map_or(true, |station| station == event.station_user_id)
    }

    /// Waits for the next matching change. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(ChangeNotice::Changed(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Change subscriber lagged by {} events", skipped);
                    return Some(ChangeNotice::Resync);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
