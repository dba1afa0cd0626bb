use std::sync::Arc;
use std::time::Duration;

use threadbridge_core::config::BridgeConfig;
use threadbridge_core::control::{request_sync, SyncCommand};
use threadbridge_core::models::{ChannelId, TicketId};
use threadbridge_core::sync::{EntityLocks, SweepScheduler, SyncReply};
use threadbridge_core::Error;

use crate::commands::common::{describe_reply, Bridge};
use crate::error::CliError;

/// Whole-pass budget when a running bridge does the work
const REMOTE_PASS_TIMEOUT: Duration = Duration::from_secs(300);

/// Hand the pass to a running bridge, or run it here when none is up.
pub async fn run_sync(
    config: BridgeConfig,
    ticket_id: TicketId,
    thread: Option<u64>,
    repair: bool,
) -> Result<(), CliError> {
    let command = SyncCommand {
        ticket_id,
        thread_id: thread.map(ChannelId),
        repair,
    };

    let reply = match request_sync(config.control_addr, &command, REMOTE_PASS_TIMEOUT).await {
        Ok(Some(reply)) => Ok(reply),
        Ok(None) => {
            tracing::info!(addr = %config.control_addr, "No running bridge, synchronizing locally");
            run_local(config, &command).await
        }
        Err(error) => Err(error.into()),
    };
    report(ticket_id, reply)
}

async fn run_local(config: BridgeConfig, command: &SyncCommand) -> Result<SyncReply, CliError> {
    let bridge = Bridge::connect(config).await?;
    let scheduler = SweepScheduler::new(
        Arc::new(bridge.synchronizer(EntityLocks::new())),
        Arc::clone(&bridge.chat),
        bridge.config.sync_interval,
    );
    let reply = scheduler
        .sync_on_demand(command.ticket_id, command.thread_id, command.repair)
        .await?;
    Ok(reply)
}

fn report(ticket_id: TicketId, reply: Result<SyncReply, CliError>) -> Result<(), CliError> {
    match reply {
        Ok(reply) => {
            println!("{}", describe_reply(ticket_id, &reply));
            Ok(())
        }
        Err(CliError::Core(
            error @ (Error::TicketNotFound(_) | Error::ThreadNotFound(_)),
        )) => {
            println!("{}", not_found_message(&error.to_string()));
            Ok(())
        }
        Err(CliError::Core(Error::Remote {
            status: 404,
            message,
        })) => {
            println!("{}", not_found_message(&message));
            Ok(())
        }
        Err(error) => Err(error),
    }
}

fn not_found_message(message: &str) -> String {
    if message.starts_with("No thread named") {
        format!("{message}. Pass --thread to pick one.")
    } else {
        message.to_string()
    }
}
