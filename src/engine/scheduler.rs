use std::sync::atomic::Ordering;

use tokio::time::Instant;

use super::Engine;
use crate::events::UiSignal;
use crate::state::model::{ActivePair, MaxTakerVolumePair};
use crate::ticker::Ticker;

/// Which refresh families a `tick` dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub orderbook: bool,
    pub info: bool,
}

impl Engine {
    /// Dispatches due refreshes onto the pool and returns without waiting
    /// for them. Meant to be driven by an external timer.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        if !self.is_running() {
            return report;
        }

        let now = Instant::now();
        let cfg = self.config();
        let (orderbook_due, info_due) = {
            let mut clocks = self.inner.clocks.lock().expect("clocks mutex poisoned");
            let orderbook_due = now.duration_since(clocks.orderbook) >= cfg.orderbook_interval;
            if orderbook_due {
                clocks.orderbook = now;
            }
            let info_due = now.duration_since(clocks.info) >= cfg.info_interval;
            if info_due {
                clocks.info = now;
            }
            (orderbook_due, info_due)
        };

        if orderbook_due {
            let engine = self.clone();
            drop(self.pool().spawn("orderbook", async move {
                engine.refresh_orderbook(false).await;
            }));

            let mut group = self.pool().group::<()>();
            let engine = self.clone();
            group.spawn("orders", async move { engine.process_orders().await });
            let engine = self.clone();
            group.spawn("swaps", async move { engine.process_swaps().await });
            drop(self.pool().spawn_coordinator("orders_swaps", group.join()));
            report.orderbook = true;
        }

        if info_due {
            let engine = self.clone();
            drop(self.pool().spawn_coordinator("infos", async move {
                engine.refresh_infos(false).await;
            }));
            report.info = true;
        }

        report
    }

    pub fn is_orderbook_active(&self) -> bool {
        self.inner.orderbook_active.load(Ordering::Acquire)
    }

    pub fn enter_trading(&self) {
        tracing::debug!("orderbook view active");
        self.inner.orderbook_active.store(true, Ordering::Release);
    }

    /// Stops scheduling orderbook refreshes. Refreshes already dispatched
    /// still land.
    pub fn leave_trading(&self) {
        tracing::debug!("orderbook view inactive");
        self.inner.orderbook_active.store(false, Ordering::Release);
    }

    /// Switches the watched pair and, when the daemon runs, refreshes it at
    /// once.
    pub fn set_current_orderbook(&self, base: &str, rel: &str) {
        let pair = ActivePair {
            base: Ticker::new(base),
            rel: Ticker::new(rel),
        };
        tracing::info!(pair = %pair.key(), "refreshing orderbook pair");
        self.state().with_pair(|state| {
            state.pair = Some(pair);
            state.max_taker_vol = MaxTakerVolumePair::default();
        });

        if self.is_running() {
            let engine = self.clone();
            drop(self.pool().spawn("orderbook_reset", async move {
                engine.refresh_orderbook(true).await;
            }));
        }
    }

    pub fn on_signal(&self, signal: UiSignal) {
        match signal {
            UiSignal::EnterTrading => self.enter_trading(),
            UiSignal::LeaveTrading => self.leave_trading(),
            UiSignal::ChangeActivePair { base, rel } => {
                self.set_current_orderbook(base.as_str(), rel.as_str())
            }
        }
    }
}
