use threadbridge_core::config::BridgeConfig;
use threadbridge_core::sanity;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_check(config: &BridgeConfig) -> Result<(), CliError> {
    let store = open_store(config)?;
    let field_ids = sanity::check(&store, config).await?;

    println!("Ticket store looks good");
    println!(
        "  sync record field '{}': id {}",
        config.sync_field_name, field_ids.sync_token
    );
    println!(
        "  chat identity field '{}': id {}",
        config.chat_identity_field_name, field_ids.chat_identity
    );
    Ok(())
}
