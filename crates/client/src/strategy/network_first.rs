//! Network-first: prefer a fresh response, fall back to any cached copy.

use super::StrategyContext;
use crate::fetch::FetchRequest;
use crate::response::ProxyResponse;
use offcache_core::{Error, RequestIdentity};

pub async fn execute(
    ctx: &StrategyContext, identity: &RequestIdentity, request: FetchRequest,
) -> Result<ProxyResponse, Error> {
    let error = match ctx.network.fetch(&request).await {
        Ok(response) => {
            if response.status.is_success() {
                ctx.capture(&ctx.dynamic_store, identity, &response).await;
            }
            return Ok(ProxyResponse::from_network(&response));
        }
        Err(e) => e,
    };

    match ctx.db.match_across_stores(identity).await? {
        Some(entry) => {
            tracing::debug!(
                %identity, error = %error, store = %entry.store_name,
                "network failed, serving cached copy"
            );
            Ok(ProxyResponse::from_entry(entry))
        }
        None => {
            tracing::warn!(%identity, error = %error, "network failed and nothing cached");
            Ok(ProxyResponse::offline_without_cache())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Resolution;
    use crate::strategy::test_support::{ORIGIN, context, request};
    use crate::testing::ScriptedNetwork;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fresh_response_captured_in_dynamic_store() {
        let network = Arc::new(ScriptedNetwork::new());
        network.route(&format!("{ORIGIN}/api/services"), 200, r#"[{"id":1}]"#);
        let ctx = context(network).await;
        let (id, req) = request("/api/services");

        let response = execute(&ctx, &id, req).await.unwrap();
        assert_eq!(response.resolution, Resolution::FromNetwork);

        let entry = ctx.db.match_entry(&ctx.stores.dynamic_store, &id).await.unwrap().unwrap();
        assert_eq!(entry.body, br#"[{"id":1}]"#);
        assert_eq!(entry.status, 200);
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_cache() {
        let network = Arc::new(ScriptedNetwork::new());
        network.route(&format!("{ORIGIN}/api/services"), 200, "sedan,van");
        let ctx = context(network.clone()).await;
        let (id, req) = request("/api/services");

        execute(&ctx, &id, req.clone()).await.unwrap();
        network.set_offline(true);

        let response = execute(&ctx, &id, req).await.unwrap();
        assert_eq!(response.resolution, Resolution::FromCache);
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "sedan,van");
    }

    #[tokio::test]
    async fn test_offline_without_cache() {
        let network = Arc::new(ScriptedNetwork::new());
        network.set_offline(true);
        let ctx = context(network).await;
        let (id, req) = request("/api/locations");

        let response = execute(&ctx, &id, req).await.unwrap();
        assert_eq!(response.status, 408);
        assert_eq!(response.text(), "Network error and no cache available");
        assert_eq!(response.resolution, Resolution::Error);
    }

    #[tokio::test]
    async fn test_server_error_returned_without_replacing_cache() {
        let network = Arc::new(ScriptedNetwork::new());
        network.route(&format!("{ORIGIN}/api/services"), 200, "good");
        let ctx = context(network.clone()).await;
        let (id, req) = request("/api/services");
        execute(&ctx, &id, req.clone()).await.unwrap();

        network.route(&format!("{ORIGIN}/api/services"), 500, "bad");
        let response = execute(&ctx, &id, req).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.resolution, Resolution::FromNetwork);

        let entry = ctx.db.match_entry(&ctx.stores.dynamic_store, &id).await.unwrap().unwrap();
        assert_eq!(entry.body, b"good");
    }
}
