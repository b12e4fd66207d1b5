//! Process lifecycle for `keyrelay serve`.
//!
//! The entry point owns the storage handle: it opens it, injects it into the
//! gate, broker and issuer, and closes it after the listener drains.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::http::HeaderValue;
use keyrelay_cdm::{CommandCdm, DeviceCredentials};
use keyrelay_gate::AdmissionGate;
use keyrelay_store::SqliteStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Cli, ServeArgs};
use crate::http::{router, AppState, Backend};

/// Open the database named on the command line.
pub fn open_store(cli: &Cli) -> anyhow::Result<SqliteStore> {
    SqliteStore::open_with(&cli.db, cli.store_options())
        .with_context(|| format!("failed to open database {}", cli.db.display()))
}

/// Run the broker until ctrl-c or SIGTERM.
pub async fn serve(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let limits = args.rate_limits().context("invalid rate limit")?;
    let server_name =
        HeaderValue::from_str(&args.server_name).context("invalid server name")?;
    let credentials = DeviceCredentials::load(&args.client_id, &args.private_key)
        .context("failed to load device credentials")?;
    let cdm = CommandCdm::with_options(
        &args.cdm_command,
        args.cdm_args.clone(),
        credentials,
        args.cdm_timeout(),
    );
    let store = Arc::new(open_store(cli)?);

    let state = AppState::from_store(Arc::clone(&store), Arc::new(cdm), limits);
    let purge = spawn_purge(state.gate().clone(), limits.window());
    let app = router(state, server_name);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(
        addr = %args.bind,
        db = %cli.db.display(),
        cdm = %args.cdm_command.display(),
        rate_limit = limits.max_requests(),
        rate_window_secs = limits.window().as_secs(),
        "keyrelay listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    purge.abort();
    let closed = store.close();
    served.context("server error")?;
    closed.context("failed to close database")?;

    info!("shutdown complete");
    Ok(())
}

/// Drop expired rate windows once per window length.
pub fn spawn_purge<S: Backend>(gate: AdmissionGate<S, S>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match gate.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "purged expired rate windows"),
                Err(e) => warn!(error = %e, "failed to purge rate windows"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use keyrelay_core::{AuthorizationPolicy, Passkey, Privileges};
    use keyrelay_gate::RateLimitConfig;
    use keyrelay_store::{MemoryStore, PermissionStore, RateCounter};

    #[tokio::test]
    async fn test_purge_task_drops_expired_windows() {
        let store = Arc::new(MemoryStore::new());
        let passkey = Passkey::new("PURGE");
        store.issue_token(&passkey, Privileges::sudoer()).await.unwrap();

        // A window that ended at the epoch
        store.hit("stale", 1, 0).await.unwrap();

        let limits = RateLimitConfig::new(10, Duration::from_secs(60)).unwrap();
        let gate = AdmissionGate::new(Arc::clone(&store), Arc::clone(&store), limits);
        gate.admit(&passkey, AuthorizationPolicy::SuperUserOrSudoer)
            .await
            .unwrap();

        let purge = spawn_purge(gate.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        purge.abort();

        // The stale window is gone; the live one survived
        assert_eq!(store.purge_expired(2).await.unwrap(), 0);
        let admission = gate
            .admit(&passkey, AuthorizationPolicy::SuperUserOrSudoer)
            .await
            .unwrap();
        assert_eq!(admission.remaining, 8);
    }

    #[test]
    fn test_open_store_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("missing").join("x.db");
        let cli = Cli::try_parse_from(["keyrelay", "superusers", "--db", db.to_str().unwrap()])
            .unwrap();
        let err = open_store(&cli).unwrap_err();
        assert!(err.to_string().contains("failed to open database"));
    }
}
