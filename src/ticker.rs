use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};

static INTERNED: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();

/// Interned coin identifier. Clones share one allocation per distinct ticker.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Ticker(Arc<str>);

impl Ticker {
    pub fn new(raw: &str) -> Self {
        let set = INTERNED.get_or_init(Default::default);
        let mut set = set.lock().expect("ticker interner poisoned");
        if let Some(existing) = set.get(raw) {
            return Self(existing.clone());
        }
        let interned: Arc<str> = Arc::from(raw);
        set.insert(interned.clone());
        Self(interned)
    }

    /// The interned ticker for `raw`, if one was ever created. Read paths use
    /// this so caller strings do not grow the interner.
    pub fn lookup(raw: &str) -> Option<Self> {
        let set = INTERNED.get_or_init(Default::default);
        let set = set.lock().expect("ticker interner poisoned");
        set.get(raw).map(|existing| Self(existing.clone()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Ticker {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Ticker {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Ticker {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0.to_string()
    }
}

impl PartialEq<str> for Ticker {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Ticker {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}
