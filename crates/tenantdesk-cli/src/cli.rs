use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tenantdesk", version, about = "Manage SaaS tenants from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate and start a session
    Login {
        /// Multi-org username (defaults to the last one used)
        #[arg(short, long, env = "TENANTDESK_USERNAME")]
        username: Option<String>,
    },
    /// End the session and forget stored credentials
    Logout,
    /// Show token health for the current session
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Request a new token now
    Refresh,
    /// List tenants
    List {
        /// Only show tenants matching this text
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one or more tenants as JSON
    Show {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Create a tenant (unset fields fall back to the environment defaults)
    Create {
        #[command(flatten)]
        fields: FieldArgs,
        #[arg(long)]
        primary_admin_email: Option<String>,
        #[arg(long)]
        primary_admin_first_name: Option<String>,
        #[arg(long)]
        primary_admin_last_name: Option<String>,
    },
    /// Update a tenant's editable fields
    Update {
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Delete tenants
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Export all tenants to a JSON file
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct FieldArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub seats: Option<i64>,
    #[arg(long)]
    pub comments: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub zip_code: Option<String>,
    #[arg(long)]
    pub country_code: Option<String>,
    #[arg(long)]
    pub address_line1: Option<String>,
    #[arg(long)]
    pub address_line2: Option<String>,
    /// Comma-separated admin emails; an empty string clears them on update
    #[arg(long)]
    pub admins: Option<String>,
}
