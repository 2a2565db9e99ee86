//! Configuration for the binder CLI
//!
//! CLI arguments and environment variable handling using clap.

use binder_sheets_client::{SheetNames, SheetsConfig};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::google::{DEFAULT_REVOKE_URL, DEFAULT_USERINFO_URL};
use crate::ownership::OwnershipEngineConfig;

/// binder - shared card binder kept in a spreadsheet
#[derive(Parser, Debug, Clone)]
#[command(name = "binder")]
#[command(about = "Track which cards each collector is missing or willing to trade")]
pub struct Args {
    /// Spreadsheet holding the Cards, Users and Ownership sheets
    #[arg(long, env = "SPREADSHEET_ID", default_value = "")]
    pub spreadsheet_id: String,

    /// Sheets API base URL
    #[arg(long, env = "SHEETS_BASE_URL", default_value = "https://sheets.googleapis.com")]
    pub sheets_base_url: String,

    /// OAuth bearer token obtained from the consent flow
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Where the credential is persisted between runs
    #[arg(long, env = "CREDENTIAL_PATH", default_value = ".binder/credential.json")]
    pub credential_path: PathBuf,

    /// Userinfo endpoint used to identify the signed-in user
    #[arg(long, env = "USERINFO_URL", default_value = DEFAULT_USERINFO_URL)]
    pub userinfo_url: String,

    /// OAuth token revocation endpoint
    #[arg(long, env = "REVOKE_URL", default_value = DEFAULT_REVOKE_URL)]
    pub revoke_url: String,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Re-read the ownership sheet after deleting a row
    #[arg(long, env = "VERIFY_DELETES", default_value_t = true, action = ArgAction::Set)]
    pub verify_deletes: bool,

    /// Sheet names
    #[command(flatten)]
    pub sheets: SheetArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Sheet (tab) names for the three tables
#[derive(Parser, Debug, Clone)]
pub struct SheetArgs {
    #[arg(long, env = "ITEMS_SHEET", default_value = "Cards")]
    pub items_sheet: String,

    #[arg(long, env = "USERS_SHEET", default_value = "Users")]
    pub users_sheet: String,

    #[arg(long, env = "OWNERSHIP_SHEET", default_value = "Ownership")]
    pub ownership_sheet: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sign in and register or update the user row
    SignIn,
    /// Revoke the credential and forget it locally
    SignOut,
    /// List the catalog with the current user's status
    Items {
        /// Only items marked as missing
        #[arg(long)]
        missing: bool,
    },
    /// Mark an item as not owned
    MarkMissing {
        /// Item id, collector number or name
        item: String,
        /// Mark it as owned again
        #[arg(long)]
        undo: bool,
    },
    /// Offer an item for trade
    MarkTradeable {
        /// Item id, collector number or name
        item: String,
        /// Withdraw the offer
        #[arg(long)]
        undo: bool,
    },
    /// Collection progress of the current user
    Stats,
    /// Who is missing an item and who offers it
    Demand {
        /// Item id, collector number or name
        item: String,
    },
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err("SPREADSHEET_ID is required".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("REQUEST_TIMEOUT_SECS must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn sheets_config(&self) -> SheetsConfig {
        SheetsConfig {
            base_url: self.sheets_base_url.clone(),
            spreadsheet_id: self.spreadsheet_id.clone(),
            sheet_names: SheetNames {
                items: self.sheets.items_sheet.clone(),
                users: self.sheets.users_sheet.clone(),
                ownership: self.sheets.ownership_sheet.clone(),
            },
            timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn engine_config(&self) -> OwnershipEngineConfig {
        OwnershipEngineConfig {
            verify_deletes: self.verify_deletes,
        }
    }
}
