//! binder - command-line client for the shared card binder

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use binder_sheets_client::SheetsClient;
use binder_sync::{
    config::{Args, Command},
    Binder, CatalogItem, FileCredentialStore, GoogleUserInfo, Session, StaticTokenConsent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("binder={},binder_sync={},info", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let store = Arc::new(SheetsClient::new(args.sheets_config()).context("building Sheets client")?);
    let consent = Arc::new(StaticTokenConsent::new(
        args.access_token.clone(),
        args.revoke_url.clone(),
        args.request_timeout_secs,
    )?);
    let persisted = Arc::new(FileCredentialStore::new(args.credential_path.clone()));
    let session = Arc::new(Session::new(consent, persisted));
    let mut binder = Binder::new(store, session, args.engine_config());

    if args.command == Command::SignOut {
        binder.sign_out().await;
        println!("Signed out");
        return Ok(());
    }

    let userinfo = GoogleUserInfo::new(args.userinfo_url.clone(), args.request_timeout_secs)?;
    let user = binder.sign_in(&userinfo).await.context("signing in")?;
    info!(user_id = %user.id, spreadsheet = %args.spreadsheet_id, "ready");

    match &args.command {
        Command::SignIn => {
            println!("Signed in as {} <{}> ({})", user.display_name, user.email, user.id);
        }
        // Handled before sign-in
        Command::SignOut => {}
        Command::Items { missing } => {
            let items: Vec<&CatalogItem> = if *missing {
                binder.missing()?
            } else {
                binder.catalog().iter().collect()
            };
            for item in items {
                let status = binder.status(&item.id)?;
                let mark = match (status.not_owned, status.tradeable) {
                    (true, _) => "missing",
                    (false, true) => "trade",
                    (false, false) => "",
                };
                println!("{:>4} {:<24} {:<4} {:<8} {}", item.number, item.name, item.category, item.group, mark);
            }
        }
        Command::MarkMissing { item, undo } => {
            let item = find(&binder, item)?;
            let record = binder.toggle_not_owned(&item, !undo).await?;
            println!(
                "{}: {}",
                item,
                if record.not_owned { "marked missing" } else { "owned" }
            );
        }
        Command::MarkTradeable { item, undo } => {
            let item = find(&binder, item)?;
            let record = binder.toggle_tradeable(&item, !undo).await?;
            println!(
                "{}: {}",
                item,
                if record.tradeable { "offered for trade" } else { "not offered" }
            );
        }
        Command::Stats => {
            let stats = binder.stats()?;
            println!("{} / {} cards ({:.1}%)", stats.owned, stats.total, stats.completion_rate);
            for (category, tally) in &stats.by_category {
                println!("  {:<6} {} / {}", category, tally.owned, tally.total);
            }
        }
        Command::Demand { item } => {
            let item = find(&binder, item)?;
            let demand = binder.demand(&item);
            println!("Missing: {}", names(&binder, demand.missing.iter()));
            println!("Offered by: {}", names(&binder, demand.offers.iter().map(|(user_id, _)| user_id)));
            for user_id in &demand.missing {
                if demand.can_receive_from_others(user_id) {
                    println!("  {} can receive it in a trade", names(&binder, std::iter::once(user_id)));
                }
            }
        }
    }

    for warning in binder.take_warnings() {
        warn!("{}", warning);
    }

    Ok(())
}

fn find(binder: &Binder, query: &str) -> anyhow::Result<String> {
    binder
        .find_item(query)
        .map(|item| item.id.clone())
        .with_context(|| format!("no catalog item matches {:?}", query))
}

fn names<'a>(binder: &Binder, user_ids: impl Iterator<Item = &'a String>) -> String {
    let names: Vec<&str> = user_ids
        .map(|id| {
            binder
                .users()
                .iter()
                .find(|user| &user.id == id)
                .map_or(id.as_str(), |user| user.display_name.as_str())
        })
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}
