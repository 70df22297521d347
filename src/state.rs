use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::config::Args;
use crate::entitlement::{EntitlementService, parse_code_list};
use crate::gate::QuotaGate;
use crate::rate_limit::BurstLimiter;
use crate::store::{LocalStore, RemoteStore, StoreClient, Stores};
use crate::upstream::UpstreamClient;
use crate::usage::UsageTracker;

// app's shared state
pub struct AppState {
    pub stores: Stores,
    pub gate: QuotaGate,
    pub entitlement: Arc<EntitlementService>,
    pub upstream: UpstreamClient,
    pub require_premium: bool,
}

impl AppState {
    // Wires everything from configuration. The shared store is chosen once,
    // here, by whether credentials are present.
    pub fn from_args(args: &Args, client: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        let shared: Option<Arc<dyn StoreClient>> = match args.store_credentials() {
            Some((url, token)) => {
                info!(%url, "using shared store");
                let remote: Arc<dyn StoreClient> =
                    Arc::new(RemoteStore::new(client.clone(), url, token));
                Some(remote)
            }
            None => {
                info!("no shared store credentials, using process-local store only");
                None
            }
        };
        let local = Arc::new(LocalStore::new(clock.clone()));

        let upstream = UpstreamClient::new(
            client,
            args.upstream_url.clone(),
            args.upstream_model.clone(),
            args.max_tokens,
            args.api_key.clone(),
        );
        let secret = args.token_secret.clone().filter(|s| !s.trim().is_empty());

        Self::new(
            Stores::new(shared, local),
            parse_code_list(&args.premium_codes),
            secret,
            upstream,
            args.require_premium,
            clock,
        )
    }

    pub fn new(
        stores: Stores,
        codes: HashSet<String>,
        secret: Option<String>,
        upstream: UpstreamClient,
        require_premium: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entitlement = Arc::new(EntitlementService::new(
            stores.shared().cloned(),
            codes,
            secret,
            clock.clone(),
        ));
        let gate = QuotaGate::new(
            BurstLimiter::new(stores.clone()),
            UsageTracker::new(stores.clone(), clock),
            entitlement.clone(),
        );
        Self {
            stores,
            gate,
            entitlement,
            upstream,
            require_premium,
        }
    }
}
