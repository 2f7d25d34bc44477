//! authdb: resource ledger administration.
//!
//! Safe to run while `authd` holds the same database open.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use admctrl_daemon::ledger::{
    LedgerError, Resource, ResourceConsumption, ResourceKey, ResourceLedger, SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "authdb", about = "Manage the authd resource ledger", version)]
struct Cli {
    /// Ledger database file.
    #[arg(long, default_value = "/etc/authd/resourcectrl/resource.db")]
    store: PathBuf,

    /// Print listings as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Function names and ids
    #[command(subcommand)]
    Function(FunctionCommand),
    /// Library names and ids
    #[command(subcommand)]
    Library(LibraryCommand),
    /// Resources and their available amounts
    #[command(subcommand)]
    Resource(ResourceCommand),
    /// What each function/library pair consumes
    #[command(subcommand)]
    Consumption(ConsumptionCommand),
}

#[derive(Subcommand, Debug)]
enum FunctionCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        id: u16,
        /// Cost does not depend on the implementing library
        #[arg(long)]
        global: bool,
    },
    /// Delete a function and its consumption records
    Del { name: String },
}

#[derive(Subcommand, Debug)]
enum LibraryCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        id: u16,
    },
    /// Delete a library and its consumption records
    Del { name: String },
}

#[derive(Subcommand, Debug)]
enum ResourceCommand {
    List,
    Add {
        #[arg(value_parser = parse_key)]
        key: ResourceKey,
        #[arg(long)]
        available: u32,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Overwrite the available amount
    Set {
        #[arg(value_parser = parse_key)]
        key: ResourceKey,
        available: u32,
    },
    /// Delete a resource and every consumption record naming it
    Del {
        #[arg(value_parser = parse_key)]
        key: ResourceKey,
    },
}

#[derive(Args, Debug)]
struct PairArgs {
    #[arg(long)]
    function: String,
    #[arg(long)]
    library: String,
}

#[derive(Subcommand, Debug)]
enum ConsumptionCommand {
    List,
    Add {
        #[command(flatten)]
        pair: PairArgs,
        #[arg(long, value_parser = parse_key)]
        resource: ResourceKey,
        #[arg(long, default_value_t = 0)]
        fixed: u32,
        /// printf-style template over the instance arguments, e.g. "%1$d * 4"
        #[arg(long, default_value = "")]
        formula: String,
    },
    Del {
        #[command(flatten)]
        pair: PairArgs,
        #[arg(long, value_parser = parse_key)]
        resource: ResourceKey,
    },
}

/// Decimal or `0x`-prefixed hexadecimal.
fn parse_key(s: &str) -> Result<ResourceKey, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(h) => u32::from_str_radix(h, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid key {s:?}: {e}"))
}

type Ledger = ResourceLedger<SqliteStore>;

async fn key_of(ledger: &Ledger, pair: &PairArgs) -> Result<ResourceKey, LedgerError> {
    ledger
        .resource_key(&pair.function, &pair.library)
        .await?
        .ok_or_else(|| LedgerError::UnknownFunction(format!("{}/{}", pair.function, pair.library)))
}

fn print_list<T: Serialize>(json: bool, rows: &[T], line: impl Fn(&T) -> String) -> Result<(), LedgerError> {
    if json {
        let text = serde_json::to_string_pretty(rows).map_err(|e| LedgerError::Format(e.to_string()))?;
        println!("{text}");
    } else {
        for r in rows {
            println!("{}", line(r));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ResourceRow<'a> {
    key: ResourceKey,
    #[serde(flatten)]
    resource: &'a Resource,
}

#[derive(Serialize)]
struct ConsumptionRow<'a> {
    key: ResourceKey,
    #[serde(flatten)]
    record: &'a ResourceConsumption,
}

async fn run(cli: Cli) -> Result<(), LedgerError> {
    let ledger = ResourceLedger::new(SqliteStore::open(&cli.store).await?);
    let json = cli.json;

    match cli.command {
        Command::Function(cmd) => match cmd {
            FunctionCommand::List => print_list(json, &ledger.functions().await?, |f| {
                format!("{:<32} {:#06x}{}", f.name, f.id, if f.global { " global" } else { "" })
            })?,
            FunctionCommand::Add { name, id, global } => {
                ledger.add_function(&name, id, global).await?;
                println!("function {name} added");
            }
            FunctionCommand::Del { name } => {
                let n = ledger.del_function(&name).await?;
                println!("function {name} deleted with {n} consumption keys");
            }
        },
        Command::Library(cmd) => match cmd {
            LibraryCommand::List => print_list(json, &ledger.libraries().await?, |l| {
                format!("{:<32} {:#06x}", l.name, l.id)
            })?,
            LibraryCommand::Add { name, id } => {
                ledger.add_library(&name, id).await?;
                println!("library {name} added");
            }
            LibraryCommand::Del { name } => {
                let n = ledger.del_library(&name).await?;
                println!("library {name} deleted with {n} consumption keys");
            }
        },
        Command::Resource(cmd) => match cmd {
            ResourceCommand::List => {
                let all = ledger.resources().await?;
                let rows: Vec<ResourceRow<'_>> = all
                    .iter()
                    .map(|(key, resource)| ResourceRow { key: *key, resource })
                    .collect();
                print_list(json, &rows, |r| {
                    format!("{:#010x} {:>10} {}", r.key, r.resource.available, r.resource.description)
                })?;
            }
            ResourceCommand::Add { key, available, description } => {
                ledger.add_resource(key, &Resource { available, description }).await?;
                println!("resource {key:#010x} added");
            }
            ResourceCommand::Set { key, available } => {
                ledger.set_available(key, available).await?;
                println!("resource {key:#010x} set to {available}");
            }
            ResourceCommand::Del { key } => {
                let n = ledger.del_resource(key).await?;
                println!("resource {key:#010x} deleted with {n} consumption records");
            }
        },
        Command::Consumption(cmd) => match cmd {
            ConsumptionCommand::List => {
                let all = ledger.consumption().await?;
                let rows: Vec<ConsumptionRow<'_>> = all
                    .iter()
                    .map(|(key, record)| ConsumptionRow { key: *key, record })
                    .collect();
                print_list(json, &rows, |r| {
                    format!(
                        "{:#010x} -> {:#010x} fixed {} formula {:?}",
                        r.key, r.record.resource, r.record.fixed_cost, r.record.formula
                    )
                })?;
            }
            ConsumptionCommand::Add { pair, resource, fixed, formula } => {
                let key = key_of(&ledger, &pair).await?;
                ledger.add_consumption(key, &ResourceConsumption { resource, fixed_cost: fixed, formula }).await?;
                println!("consumption added under {key:#010x}");
            }
            ConsumptionCommand::Del { pair, resource } => {
                let key = key_of(&ledger, &pair).await?;
                let n = ledger.del_consumption(key, resource).await?;
                println!("{n} consumption records deleted under {key:#010x}");
            }
        },
    }
    ledger.store().close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("authdb: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_in_decimal_and_hex() {
        assert_eq!(parse_key("65537"), Ok(65537));
        assert_eq!(parse_key("0x00010001"), Ok(65537));
        assert!(parse_key("0xZZ").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
