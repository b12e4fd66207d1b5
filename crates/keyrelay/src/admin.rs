//! Operator subcommands that work directly against the database.
//!
//! `issue` is how the first super-user passkey comes to exist.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context as _;
use keyrelay_store::SqliteStore;

use crate::api::{RevokeRequest, TokenRequest};
use crate::config::{Cli, IssueArgs, RevokeArgs};
use crate::issuer::PasskeyIssuer;
use crate::server::open_store;

/// Print every super-user passkey, one per line.
pub async fn superusers(cli: &Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let passkeys = with_issuer(cli, |issuer| async move { Ok(issuer.superusers().await?) }).await?;
    for passkey in passkeys {
        writeln!(out, "{}", passkey.as_str())?;
    }
    Ok(())
}

/// Issue passkeys and print them, one per line.
pub async fn issue(cli: &Cli, args: &IssueArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let request = TokenRequest {
        quantity: Some(args.quantity),
        super_user: args.super_user,
        sudoer: args.sudoer,
    };
    let passkeys = with_issuer(cli, |issuer| async move { Ok(issuer.issue(&request).await?) }).await?;
    for passkey in passkeys {
        writeln!(out, "{}", passkey.as_str())?;
    }
    Ok(())
}

/// Revoke one passkey.
pub async fn revoke(cli: &Cli, args: &RevokeArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let request = RevokeRequest {
        token: Some(args.token.clone()),
    };
    let passkey = with_issuer(cli, |issuer| async move { Ok(issuer.revoke(&request).await?) }).await?;
    writeln!(out, "revoked {}", passkey.fingerprint())?;
    Ok(())
}

/// Open the store, run `f`, and close the store whatever `f` returned.
async fn with_issuer<T, F, Fut>(cli: &Cli, f: F) -> anyhow::Result<T>
where
    F: FnOnce(PasskeyIssuer<SqliteStore>) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let store = Arc::new(open_store(cli)?);
    let result = f(PasskeyIssuer::new(Arc::clone(&store))).await;
    store.close().context("failed to close database")?;
    result
}
