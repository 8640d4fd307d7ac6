//! Cache-first: serve any cached copy, touch the network only on a miss.

use super::StrategyContext;
use crate::fetch::FetchRequest;
use crate::response::ProxyResponse;
use offcache_core::{Error, RequestIdentity};

pub async fn execute(
    ctx: &StrategyContext, identity: &RequestIdentity, request: FetchRequest,
) -> Result<ProxyResponse, Error> {
    if let Some(entry) = ctx.db.match_across_stores(identity).await? {
        tracing::debug!(%identity, store = %entry.store_name, "cache hit");
        return Ok(ProxyResponse::from_entry(entry));
    }

    tracing::debug!(%identity, "cache miss");

    match ctx.network.fetch(&request).await {
        Ok(response) => {
            if response.status.is_success() {
                ctx.capture(&ctx.static_store, identity, &response).await;
            }
            Ok(ProxyResponse::from_network(&response))
        }
        Err(e) => {
            tracing::warn!(%identity, error = %e, "network failed on cache miss");
            Ok(ProxyResponse::network_error())
        }
    }
}
