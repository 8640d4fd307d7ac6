//! Stale-while-revalidate: answer from the dynamic store at once and refresh
//! it in the background.
//!
//! A revalidation is started for every request. On a hit it runs as tracked
//! background work so the caller gets the cached copy immediately; on a miss
//! the caller waits for it.

use super::StrategyContext;
use crate::fetch::FetchRequest;
use crate::response::ProxyResponse;
use offcache_core::{Error, RequestIdentity};

pub async fn execute(
    ctx: &StrategyContext, identity: &RequestIdentity, request: FetchRequest,
) -> Result<ProxyResponse, Error> {
    let cached = ctx.dynamic_store.matching(identity).await?;

    match cached {
        Some(entry) => {
            tracing::debug!(%identity, "serving stale copy, revalidating in background");
            let ctx_bg = ctx.clone();
            let identity_bg = identity.clone();
            ctx.pending.spawn(async move {
                if let Err(e) = revalidate(&ctx_bg, &identity_bg, &request).await {
                    tracing::warn!(identity = %identity_bg, error = %e, "background revalidation failed");
                }
            });
            Ok(ProxyResponse::from_entry(entry))
        }
        None => match revalidate(ctx, identity, &request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!(%identity, error = %e, "network failed and nothing cached");
                Ok(ProxyResponse::network_error())
            }
        },
    }
}

/// Fetch and, on 2xx, overwrite the dynamic entry.
async fn revalidate(
    ctx: &StrategyContext, identity: &RequestIdentity, request: &FetchRequest,
) -> Result<ProxyResponse, Error> {
    let response = ctx.network.fetch(request).await?;
    if response.status.is_success() {
        ctx.capture(&ctx.dynamic_store, identity, &response).await;
    }
    Ok(ProxyResponse::from_network(&response))
}
