//! Forwarding: sweep the wallet to the forwarding address once a received
//! payment has two confirmations.

use crate::address::Address;
use crate::error::WalletResult;
use crate::wallet::{SendRequest, SendResult, Transaction, WalletSession};

/// Sweep the whole balance to `to`. `Ok(None)` when `received` is itself a
/// credit-funding transaction, which is never forwarded.
pub async fn forward_coins(
    wallet: &dyn WalletSession,
    to: &Address,
    received: &Transaction,
) -> WalletResult<Option<SendResult>> {
    if received.is_credit_funding() {
        tracing::debug!(txid = %received.txid, "credit funding transaction, not forwarding");
        return Ok(None);
    }

    let result = wallet.send(SendRequest::empty_wallet(to.clone())).await?;
    tracing::info!(txid = %result.tx.txid, to = %to, "Sending ...");

    let broadcast = result.broadcast.clone();
    let txid = result.tx.txid;
    tokio::spawn(async move {
        if broadcast.wait().await {
            tracing::info!("Sent coins onwards! Transaction hash is {}", txid);
        } else {
            tracing::warn!(txid = %txid, "sweep broadcast abandoned by wallet");
        }
    });

    Ok(Some(result))
}
