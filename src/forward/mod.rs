//! Turning a captured transaction into a delivered message

pub mod error;
pub mod relay;
pub mod resolve;
pub mod rewrite;

pub use error::ForwardError;
pub use relay::{OutboundMessage, RelayClient, Upstream};
pub use resolve::{RewriteRule, bare_address};
pub use rewrite::{ParsedMessage, rewrite};

use crate::smtp::Transaction;

use tracing::warn;

/// Resolve the recipient and rewrite the message, without sending it.
///
/// An unresolved recipient is not an error here: the message is addressed
/// to the empty string and the relay rejects it.
pub fn prepare(
    transaction: &Transaction,
    rule: &RewriteRule,
) -> Result<OutboundMessage, ForwardError> {
    let recipient = rule.resolve(&transaction.recipients).unwrap_or_else(|| {
        warn!(
            recipients = ?transaction.recipients,
            "No recipient matches @{}", rule.fake_domain
        );
        String::new()
    });

    let payload = rewrite(&transaction.body, &recipient)?;

    Ok(OutboundMessage {
        sender: bare_address(&transaction.sender).to_owned(),
        recipient,
        payload,
    })
}

/// Run the whole pipeline for one transaction
pub fn forward(
    transaction: Transaction,
    rule: &RewriteRule,
    upstream: &dyn Upstream,
) -> Result<OutboundMessage, ForwardError> {
    let message = prepare(&transaction, rule)?;
    upstream.submit(&message)?;
    Ok(message)
}
