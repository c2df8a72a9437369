//! Cached SIP credential resolution
//!
//! The operator's soft phone registers against the provider under a SIP
//! address that changes rarely. Resolving it is a provider API call, so the
//! value is cached with a TTL (default one hour). Fetch failures propagate
//! to the caller and are never cached; the next caller retries.

use puente_core::traits::CallControlApi;
use puente_core::AppResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct CachedAddress {
    address: String,
    fetched_at: Instant,
}

/// TTL cache over `CallControlApi::resolve_sip_address`
///
/// Concurrent callers during a refresh serialize on the write lock and the
/// second one reuses the fresh value; a value past its TTL is never served.
pub struct SipAddressCache<C> {
    api: Arc<C>,
    ttl: Duration,
    cached: RwLock<Option<CachedAddress>>,
}

impl<C: CallControlApi> SipAddressCache<C> {
    pub fn new(api: Arc<C>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// The SIP address to dial the operator's phone at
    pub async fn get(&self) -> AppResult<String> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.address.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.address.clone());
            }
        }

        let address = self.api.resolve_sip_address().await?;
        debug!(%address, "SIP address refreshed");

        *cached = Some(CachedAddress {
            address: address.clone(),
            fetched_at: Instant::now(),
        });

        Ok(address)
    }
}
