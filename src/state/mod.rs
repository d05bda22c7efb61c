pub mod model;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, RwLock};

use crate::coins::CoinConfig;
use crate::ticker::Ticker;
use model::{
    BalanceInfo, OrderbookSnapshot, OrdersSnapshot, PairState, SwapsSnapshot, TradeFeeInfo, TxInfo,
    TxSyncState,
};

/// Concurrent last-writer-wins map. Reads hand out clones so no lock is held
/// by callers.
#[derive(Debug)]
pub struct Registry<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_or_assign(&self, key: K, value: V) {
        self.inner
            .write()
            .expect("registry lock poisoned")
            .insert(key, value);
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .contains_key(key)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner
            .write()
            .expect("registry lock poisoned")
            .remove(key)
    }

    /// Applies `f` to the stored value in place. Returns false when absent.
    pub fn update<Q>(&self, key: &Q, f: impl FnOnce(&mut V)) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut map = self.inner.write().expect("registry lock poisoned");
        match map.get_mut(key) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<V> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.inner.write().expect("registry lock poisoned").clear();
    }
}

/// Single-value registry for answers that are replaced wholesale.
#[derive(Debug)]
pub struct Slot<T> {
    inner: RwLock<Option<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }
}

impl<T: Clone> Slot<T> {
    pub fn get(&self) -> Option<T> {
        self.inner.read().expect("slot lock poisoned").clone()
    }

    pub fn set(&self, value: T) {
        *self.inner.write().expect("slot lock poisoned") = Some(value);
    }

    pub fn read<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.inner.read().expect("slot lock poisoned").as_ref())
    }
}

#[derive(Debug, Default)]
pub struct Registries {
    pub coins: Registry<Ticker, CoinConfig>,
    pub balances: Registry<Ticker, BalanceInfo>,
    pub transactions: Registry<Ticker, Vec<TxInfo>>,
    pub tx_state: Registry<Ticker, TxSyncState>,
    /// Keyed by "BASE/REL".
    pub orderbooks: Registry<String, OrderbookSnapshot>,
    pub trade_fees: Registry<Ticker, TradeFeeInfo>,
    pub orders: Slot<OrdersSnapshot>,
    pub swaps: Slot<SwapsSnapshot>,
    pub pair: Mutex<PairState>,
}

impl Registries {
    pub fn pair_state(&self) -> PairState {
        self.pair.lock().expect("pair lock poisoned").clone()
    }

    pub fn with_pair<R>(&self, f: impl FnOnce(&mut PairState) -> R) -> R {
        f(&mut self.pair.lock().expect("pair lock poisoned"))
    }
}
