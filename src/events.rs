use tokio::sync::broadcast;

use crate::ticker::Ticker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DaemonInitialized,
    DaemonStarted,
    CoinEnabled(Ticker),
    CoinDisabled(Ticker),
    /// Published by the fiat provider once a newly enabled coin has rates.
    CoinFullyInitialized(Ticker),
    EnabledCoinsChanged,
    DefaultCoinsEnabled,
    BalanceUpdated(Ticker),
    TxFetchFinished(Ticker),
    OrderbookRefreshed { pair: String, is_reset: bool },
    OrdersRefreshed,
    SwapsRefreshed,
}

/// Signals sent by the consumer to steer orderbook refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSignal {
    EnterTrading,
    LeaveTrading,
    ChangeActivePair { base: Ticker, rel: Ticker },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Never blocks and never fails; events published with no subscriber are
    /// dropped.
    pub fn publish(&self, event: Event) {
        tracing::trace!(?event, "publish");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription. Dropping it (or calling `unsubscribe`) detaches it.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone. A subscriber that falls
    /// behind skips the overwritten events.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn unsubscribe(self) {}
}
