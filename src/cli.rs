use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tokenctl: manage entity tokens from the command line
#[derive(Parser)]
#[command(name = "tokenctl", version, about)]
pub struct Cli {
    /// YAML token configuration
    #[arg(long, global = true, env = "TOKENS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the token and blacklist tables
    Migrate,

    /// Issue a token for an owner
    Issue {
        #[arg(long)]
        owner_type: String,
        #[arg(long)]
        owner_id: String,
        #[arg(long = "type")]
        token_type: String,
        /// Lifetime such as 30s, 15m, 2h or 7d
        #[arg(long, value_parser = parse_expires_in)]
        expires_in: Option<chrono::Duration>,
        /// JSON object attached to the token
        #[arg(long)]
        payload: Option<String>,
        /// Issue with this driver instead of the default
        #[arg(long)]
        driver: Option<String>,
    },

    /// Look a token up and print it as JSON
    Inspect {
        secret: String,
        #[arg(long)]
        owner_type: Option<String>,
        #[arg(long = "type")]
        token_type: Option<String>,
    },

    /// Revoke tokens matching the given filters
    Revoke {
        #[arg(long)]
        owner_type: Option<String>,
        /// Requires --owner-type
        #[arg(long, requires = "owner_type")]
        owner_id: Option<String>,
        #[arg(long = "type")]
        token_type: Option<String>,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        payload: Option<String>,
    },

    /// Revoke every token issued so far
    RevokeAll {
        /// Confirm the irreversible revocation
        #[arg(long)]
        yes: bool,
    },

    /// Compact the revocation blacklist
    Compact {
        /// Keep running, compacting every N seconds
        #[arg(long)]
        every: Option<u64>,
    },
}

/// Parse `<n><unit>` with unit one of s, m, h, d.
pub fn parse_expires_in(raw: &str) -> Result<chrono::Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{}' (use s, m, h or d)", raw))?;
    let (amount, unit) = raw.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("invalid amount in '{}'", raw))?;
    match unit {
        "s" => Ok(chrono::Duration::seconds(amount)),
        "m" => Ok(chrono::Duration::minutes(amount)),
        "h" => Ok(chrono::Duration::hours(amount)),
        "d" => Ok(chrono::Duration::days(amount)),
        other => Err(format!("unknown unit '{}' (use s, m, h or d)", other)),
    }
}
