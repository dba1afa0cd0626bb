use clap::{Parser, Subcommand};
use threadbridge_core::TicketId;

#[derive(Parser)]
#[command(name = "threadbridge")]
#[command(about = "Keep support tickets and their chat threads in sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync and lifecycle schedulers until interrupted
    Run,
    /// Verify the ticket store setup and print the resolved field ids
    Check,
    /// Synchronize one ticket with its thread right now, through the running bridge if any
    Sync {
        /// Ticket id, with or without a leading '#'
        ticket: TicketId,
        /// Thread id; looked up by thread name when omitted
        #[arg(long, value_name = "ID")]
        thread: Option<u64>,
        /// Clear the ticket's sync record before the pass
        #[arg(long)]
        repair: bool,
    },
    /// Remind assignees and watchers about inactive tickets
    Dusty {
        /// Only list the tickets that would get a reminder
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Hand long-inactive tickets back to their team
    Recycle {
        /// Only list the tickets that would be recycled
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
