use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use entity_tokens::config;
use entity_tokens::jobs::compaction;
use entity_tokens::models::token::{Expiry, OwnerId, OwnerRef, Payload};
use entity_tokens::query::{DeleteFilter, TokenCriteria};
use entity_tokens::service::{TokenOptions, TokenService};
use entity_tokens::store::SqlStore;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = cli::Cli::parse();
    let cfg = config::load(args.config.as_deref())?;

    let store = SqlStore::connect(&cfg.database_url, cfg.tokens.tables()?)
        .await
        .with_context(|| format!("failed to open {}", cfg.database_url))?;

    let service = TokenService::new(&cfg.tokens, store, cfg.codec()?)?;
    handle_command(args.command, &service).await
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "entity_tokens=info,tokenctl=info".into()),
    );
    let json = std::env::var("TOKENS_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn handle_command(cmd: cli::Commands, service: &TokenService) -> anyhow::Result<()> {
    match cmd {
        cli::Commands::Migrate => {
            let store = service.store();
            store.migrate().await?;
            println!(
                "Tables ready: {}, {}",
                store.tables().tokens(),
                store.tables().blacklist()
            );
        }
        cli::Commands::Issue {
            owner_type,
            owner_id,
            token_type,
            expires_in,
            payload,
            driver,
        } => {
            let owner = OwnerRef::new(owner_type, OwnerId::parse(&owner_id));
            let mut options = TokenOptions::new();
            if let Some(after) = expires_in {
                options = options.expires(Expiry::In(after));
            }
            if let Some(raw) = payload {
                options = options.payload(parse_payload(&raw)?);
            }
            if let Some(driver) = driver {
                options = options.driver(driver);
            }

            let record = service.create(&owner, &token_type, options).await?;
            println!(
                "Token issued:\n  ID:      {}\n  Driver:  {}\n  Expires: {}\n  Secret:  {}",
                record.id(),
                record.driver(),
                record
                    .expires_at()
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".into()),
                record.secret()
            );
        }
        cli::Commands::Inspect {
            secret,
            owner_type,
            token_type,
        } => {
            let mut query = service.query();
            if let Some(owner_type) = owner_type {
                query = query.where_owner_type(owner_type);
            }
            if let Some(token_type) = token_type {
                query = query.where_type(token_type);
            }
            match query.find(&secret).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("token not found, expired or revoked"),
            }
        }
        cli::Commands::Revoke {
            owner_type,
            owner_id,
            token_type,
            id,
            payload,
        } => {
            let mut criteria = TokenCriteria::new();
            match (owner_type, owner_id) {
                (Some(owner_type), Some(owner_id)) => {
                    criteria = criteria.with_owner(OwnerRef::new(owner_type, OwnerId::parse(&owner_id)));
                }
                (Some(owner_type), None) => criteria = criteria.with_owner_type(owner_type),
                _ => {}
            }
            if let Some(token_type) = token_type {
                criteria = criteria.with_type(token_type);
            }
            if let Some(raw) = payload {
                criteria = criteria.with_payload(parse_payload(&raw)?);
            }

            let filter = DeleteFilter::new(criteria, id)?;
            service.delete_by(&filter).await?;
            println!("Revoked matching tokens in: {}", service.drivers().names().join(", "));
        }
        cli::Commands::RevokeAll { yes } => {
            if !yes {
                anyhow::bail!("refusing to revoke every token without --yes");
            }
            service.force_delete_all().await?;
            println!("Revoked all tokens in: {}", service.drivers().names().join(", "));
        }
        cli::Commands::Compact { every } => match every {
            Some(secs) => {
                let handle = compaction::spawn(service.store().clone(), Duration::from_secs(secs.max(1)));
                tracing::info!(every_secs = secs, "blacklist compaction running");
                tokio::signal::ctrl_c().await?;
                handle.abort();
            }
            None => {
                let removed = compaction::run_once(service.store()).await?;
                println!("Removed {} shadowed blacklist entries", removed);
            }
        },
    }

    Ok(())
}

fn parse_payload(raw: &str) -> anyhow::Result<Payload> {
    serde_json::from_str::<Payload>(raw).context("payload must be a JSON object")
}
