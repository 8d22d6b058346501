//! Process assembly: store, delivery pipeline and the HTTP surface.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{RelayConfig, load_rules_file};
use crate::delivery::DeliveryOrchestrator;
use crate::error::Result;
use crate::inbound::{InboundHandler, inbound_routes};
use crate::rules::RuleResolver;
use crate::staging::{BlobStager, retrieval_routes, unmatched};
use crate::store::LibSqlStore;

/// Inbound, health and blob retrieval routes on one router.
///
/// Anything no route serves, an unknown path or a wrong method on a known
/// one, gets the retrieval endpoint's generic 400.
pub fn relay_router(
    handler: Arc<InboundHandler>,
    stager: BlobStager,
    max_message_bytes: usize,
) -> Router {
    inbound_routes(handler, max_message_bytes)
        .merge(retrieval_routes(stager))
        .method_not_allowed_fallback(unmatched)
}

/// Open the store, load the optional rules file and wire the pipeline.
pub async fn build(config: &RelayConfig) -> Result<Router> {
    let store = Arc::new(LibSqlStore::new_local(&config.db_path).await?);

    if let Some(path) = &config.rules_file {
        let rules = load_rules_file(path)?;
        for rule in &rules {
            store.upsert_rule(&rule.pattern, &rule.config).await?;
        }
        info!(count = rules.len(), path = %path.display(), "Loaded rules file");
    }

    let stager = BlobStager::new(store.clone(), config.storage_url_prefix.clone());
    let orchestrator = DeliveryOrchestrator::new(
        reqwest::Client::new(),
        &config.endpoints,
        stager.clone(),
        config.delivery.clone(),
    );
    let resolver = RuleResolver::new(store, config.pattern_mode);
    let handler = Arc::new(InboundHandler::new(resolver, orchestrator));

    Ok(relay_router(handler, stager, config.max_message_bytes))
}

/// Serve the relay on `config.bind` until ctrl-c.
pub async fn serve(config: &RelayConfig) -> Result<()> {
    let app = build(config).await?;
    let listener = TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "Mail relay started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::delivery::DeliveryOptions;
    use crate::error::Error;
    use crate::providers::ProviderEndpoints;
    use crate::rules::PatternMode;

    fn config(dir: &tempfile::TempDir, rules_file: Option<PathBuf>) -> RelayConfig {
        RelayConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            db_path: dir.path().join("relay.db"),
            storage_url_prefix: "http://files.test".into(),
            pattern_mode: PatternMode::Regex,
            max_message_bytes: 1024 * 1024,
            delivery: DeliveryOptions::default(),
            endpoints: ProviderEndpoints::default(),
            rules_file,
        }
    }

    async fn status(app: Router, method: &str, uri: &str) -> StatusCode {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn unserved_paths_and_methods_are_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = build(&config(&dir, None)).await.unwrap();

        assert_eq!(status(app.clone(), "GET", "/health").await, StatusCode::OK);
        assert_eq!(status(app.clone(), "GET", "/a/b").await, StatusCode::BAD_REQUEST);
        assert_eq!(status(app.clone(), "GET", "/inbound").await, StatusCode::BAD_REQUEST);
        assert_eq!(
            status(app, "DELETE", "/0f8fad5b-d9cb-469f-a165-70867728950e").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn malformed_rules_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.json");
        std::fs::write(&rules, "{not json").unwrap();

        let err = build(&config(&dir, Some(rules))).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn rules_file_is_loaded_into_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.json");
        // The rule fails validation, so delivery stops before any network call.
        std::fs::write(
            &rules,
            r#"[{"pattern": "a@x\\.com", "config": {"im_type": "slack", "im_config": {"token": "", "channel_id": "C1"}}}]"#,
        )
        .unwrap();
        let app = build(&config(&dir, Some(rules))).await.unwrap();

        let mail = "From: b@x.com\r\nTo: a@x.com\r\nSubject: s\r\n\r\nhello\r\n";
        let post = |to: &str| {
            Request::post(format!("/inbound?to={to}&from=b@x.com"))
                .body(Body::from(mail))
                .unwrap()
        };
        let routed = app.clone().oneshot(post("a@x.com")).await.unwrap();
        assert_eq!(routed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let unrouted = app.oneshot(post("c@x.com")).await.unwrap();
        assert_eq!(unrouted.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
