//! In-memory GENA transport for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sonos_discovery::ServiceDescriptor;
use tokio::time::Instant;

use crate::error::SubscriptionError;
use crate::gena::{GenaGrant, GenaTransport};

pub(crate) struct MockGena {
    pub granted: Duration,
    pub fail_subscribe_paths: Vec<String>,
    pub fail_renewals: bool,
    pub rekey_renewals: bool,
    pub subscribes: Mutex<Vec<(String, String)>>,
    pub renewals: Mutex<Vec<(String, Instant)>>,
    pub unsubscribes: Mutex<Vec<String>>,
    next_sid: AtomicU32,
}

impl MockGena {
    pub fn granting(granted: Duration) -> Self {
        Self {
            granted,
            fail_subscribe_paths: Vec::new(),
            fail_renewals: false,
            rekey_renewals: false,
            subscribes: Mutex::new(Vec::new()),
            renewals: Mutex::new(Vec::new()),
            unsubscribes: Mutex::new(Vec::new()),
            next_sid: AtomicU32::new(1),
        }
    }

    fn sid(&self) -> String {
        format!("uuid:sub-{}", self.next_sid.fetch_add(1, Ordering::SeqCst))
    }

    pub fn renewal_count(&self) -> usize {
        self.renewals.lock().unwrap().len()
    }
}

#[async_trait]
impl GenaTransport for MockGena {
    async fn subscribe(
        &self,
        service: &ServiceDescriptor,
        callback_url: &str,
        _timeout: Duration,
    ) -> Result<GenaGrant, SubscriptionError> {
        self.subscribes
            .lock()
            .unwrap()
            .push((service.event_sub_url.clone(), callback_url.to_string()));

        if self.fail_subscribe_paths.contains(&service.event_sub_url) {
            return Err(SubscriptionError::Rejected(503));
        }

        Ok(GenaGrant {
            sid: self.sid(),
            timeout: self.granted,
        })
    }

    async fn renew(
        &self,
        _service: &ServiceDescriptor,
        sid: &str,
        _timeout: Duration,
    ) -> Result<GenaGrant, SubscriptionError> {
        self.renewals
            .lock()
            .unwrap()
            .push((sid.to_string(), Instant::now()));

        if self.fail_renewals {
            return Err(SubscriptionError::Rejected(412));
        }

        let sid = if self.rekey_renewals {
            self.sid()
        } else {
            sid.to_string()
        };
        Ok(GenaGrant {
            sid,
            timeout: self.granted,
        })
    }

    async fn unsubscribe(&self, _service: &ServiceDescriptor, sid: &str) -> Result<(), SubscriptionError> {
        self.unsubscribes.lock().unwrap().push(sid.to_string());
        Ok(())
    }
}
