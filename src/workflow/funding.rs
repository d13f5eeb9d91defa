//! Identity funding: at one confirmation, burn credits against a fresh
//! authentication key.

use crate::error::WalletResult;
use crate::wallet::{BroadcastHandle, Coin, CreditFundingTransaction, SendRequest, Transaction, WalletSession};

/// Credits burned per identity.
pub const CREDIT_FUNDING_AMOUNT: Coin = Coin::from_duffs(40_000);

/// Build and broadcast a credit-funding transaction. `Ok(None)` when
/// `received` is itself credit funding.
pub async fn fund_identity(
    wallet: &dyn WalletSession,
    received: &Transaction,
    amount: Coin,
) -> WalletResult<Option<(CreditFundingTransaction, BroadcastHandle)>> {
    if received.is_credit_funding() {
        return Ok(None);
    }

    let key = wallet.fresh_authentication_key().await?;
    let result = wallet.send(SendRequest::credit_funding(key.clone(), amount)).await?;
    tracing::info!(txid = %result.tx.txid, key_index = key.index, amount = %amount, "Sending Credit Funding Transaction...");

    let Some(funding) = CreditFundingTransaction::from_transaction(result.tx.clone()) else {
        // Wallet built something without a burn output; nothing to register.
        tracing::error!(txid = %result.tx.txid, "wallet returned a transaction without a credit burn output");
        return Ok(None);
    };

    let broadcast = result.broadcast.clone();
    let tx = result.tx;
    tokio::spawn(async move {
        if broadcast.wait().await {
            tracing::info!("Blockchain Identity Funding Transaction hash is {}", tx.txid);
            tracing::info!("{}", tx);
        }
    });

    Ok(Some((funding, result.broadcast)))
}
