//! Per-subscription renewal timers.
//!
//! Every subscription gets one task that sleeps until its renewal is due,
//! renews, and goes back to sleep with the new grant. Renewals of one
//! subscription are therefore strictly sequential. A failed renewal marks the
//! subscription lapsed and ends the task; there is no retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::gena::GenaTransport;
use crate::registry::SubscriptionRegistry;

/// Everything a renewal task needs, shared by all of them.
#[derive(Clone)]
pub(crate) struct Renewer {
    pub transport: Arc<dyn GenaTransport>,
    pub registry: SubscriptionRegistry,
    pub config: Arc<StreamConfig>,
    pub cancel: CancellationToken,
}

impl Renewer {
    /// Start renewing `sid`, first renewal due per `granted`.
    pub fn spawn(&self, sid: String, granted: Duration) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(sid, granted))
    }

    async fn run(self, mut sid: String, mut granted: Duration) {
        loop {
            let delay = self.config.renewal_delay(granted);
            debug!(%sid, ?delay, "renewal scheduled");

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(subscription) = self.registry.get(&sid) else {
                debug!(%sid, "subscription removed, stopping renewal");
                return;
            };

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.transport.renew(&subscription.service, &sid, self.config.subscription_timeout) => result,
            };

            match result {
                Ok(grant) => {
                    if !self.registry.renewed(&sid, &grant.sid, grant.timeout) {
                        debug!(%sid, "subscription removed during renewal");
                        return;
                    }
                    if grant.sid != sid {
                        info!(old_sid = %sid, new_sid = %grant.sid, "subscription re-keyed on renewal");
                    }
                    debug!(
                        sid = %grant.sid,
                        zp_udn = %subscription.zone_player_udn,
                        service = %subscription.service_tag,
                        timeout = grant.timeout.as_secs(),
                        "subscription renewed"
                    );
                    sid = grant.sid;
                    granted = grant.timeout;
                }
                Err(e) => {
                    warn!(
                        %sid,
                        zp_udn = %subscription.zone_player_udn,
                        service = %subscription.service_tag,
                        error = %e,
                        "renewal failed, subscription lapsed"
                    );
                    self.registry.mark_lapsed(&sid);
                    return;
                }
            }
        }
    }
}
