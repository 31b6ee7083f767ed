use std::{sync::Arc, time::Duration};

use serde::Serialize;

use crate::{remote::ObjectStore, storage::cache::TtlCache};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub connected: bool,
    pub is_network_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Connectivity {
    pub fn online() -> Self {
        Self {
            connected: true,
            is_network_error: false,
            error: None,
        }
    }
}

/// Cached answer to "can the store be reached and authorized right now?".
///
/// Failures are cached as well, so an offline backend costs one bounded
/// handshake per TTL instead of one per request.
pub struct ConnectivityProbe {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
    cache: TtlCache<(), Connectivity>,
}

impl ConnectivityProbe {
    pub fn new(store: Arc<dyn ObjectStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn check(&self) -> Connectivity {
        if let Some(result) = self.cache.get(&()) {
            return result;
        }

        let result = match self.store.authorize(self.timeout) {
            Ok(()) => Connectivity::online(),
            Err(e) => {
                let is_network_error = e.is_network();
                if is_network_error {
                    log::warn!("remote store unreachable: {e}");
                } else {
                    log::warn!("remote store authorization failed: {e}");
                }
                Connectivity {
                    connected: false,
                    is_network_error,
                    error: Some(e.to_string()),
                }
            }
        };

        self.cache.insert((), result.clone());
        result
    }
}
