//! Operator commands, run from the CLI against the store port.

use std::sync::Arc;

use anyhow::Result;

use crate::store::DocStore;

#[derive(Debug, Clone)]
pub enum AdminCommand {
    GrantAdmin { email: String },
    VerifyAllUsers,
    TruncateAll,
}

/// Execute one operator command and report to stdout. Exits non-zero via the
/// caller when the command fails.
pub async fn run(store: &Arc<dyn DocStore>, command: AdminCommand) -> Result<()> {
    match command {
        AdminCommand::GrantAdmin { email } => {
            if store.grant_admin(&email).await? {
                println!("Granted admin to {email}");
            } else {
                println!("No user found for {email}");
            }
        }
        AdminCommand::VerifyAllUsers => {
            let flipped = store.mark_all_users_verified().await?;
            println!("Marked {flipped} users verified");
        }
        AdminCommand::TruncateAll => {
            store.truncate_all().await?;
            println!("All tables truncated");
        }
    }
    Ok(())
}
