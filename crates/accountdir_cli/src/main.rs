//! Operator entry point for the account directory.
//!
//! # Responsibility
//! - Verify `accountdir_core` linkage with a deterministic probe.
//! - Offer read-only inspection of an account store (`list`, `show`).
//!
//! Usage:
//! `accountdir_cli [--config <file.json>] [<db_path> [list | show <key> <value>]]`

use accountdir_core::{
    open_db, AccountDirectory, Argon2CredentialHasher, DirectoryConfig, SqliteAccountRepository,
};
use log::info;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(mut args: Vec<String>) -> Result<(), String> {
    let config = match take_config_path(&mut args)? {
        Some(path) => {
            let source = std::fs::read_to_string(&path)
                .map_err(|err| format!("failed to read config `{path}`: {err}"))?;
            DirectoryConfig::from_json_str(&source)?
        }
        None => DirectoryConfig::default(),
    };
    if let Some(logging) = &config.logging {
        accountdir_core::init_logging(logging)?;
    }

    println!("accountdir_core ping={}", accountdir_core::ping());
    println!("accountdir_core version={}", accountdir_core::core_version());

    let mut rest = args.into_iter();
    let Some(db_path) = rest.next() else {
        return Ok(());
    };
    let command = rest.next().unwrap_or_else(|| "list".to_string());

    let conn = open_db(&db_path).map_err(|err| err.to_string())?;
    let repo = SqliteAccountRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let hasher = Argon2CredentialHasher::new(&config.hashing).map_err(|err| err.to_string())?;
    let directory = AccountDirectory::new(repo, hasher, &config);
    info!("event=cli_command module=cli status=start command={command}");

    match command.as_str() {
        "list" => {
            let accounts = directory
                .list_all(directory.deadline())
                .map_err(|err| err.to_string())?;
            for account in &accounts {
                println!(
                    "{}\t{}\t{}\t{}",
                    account.id,
                    account.username,
                    account.email,
                    if account.enabled { "enabled" } else { "disabled" }
                );
            }
            println!("accounts={}", accounts.len());
            Ok(())
        }
        "show" => {
            let (Some(key), Some(value)) = (rest.next(), rest.next()) else {
                return Err("usage: show <id|username|email> <value>".to_string());
            };
            let account = directory
                .find_by_attribute(&key, &value, directory.deadline())
                .map_err(|err| err.to_string())?;
            let rendered = serde_json::to_string_pretty(&account).map_err(|err| err.to_string())?;
            println!("{rendered}");
            Ok(())
        }
        other => Err(format!("unknown command `{other}`; expected list|show")),
    }
}

fn take_config_path(args: &mut Vec<String>) -> Result<Option<String>, String> {
    let Some(position) = args.iter().position(|arg| arg == "--config") else {
        return Ok(None);
    };
    if position + 1 >= args.len() {
        return Err("--config requires a file path".to_string());
    }
    let path = args.remove(position + 1);
    args.remove(position);
    Ok(Some(path))
}
