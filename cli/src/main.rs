//! stakeindex CLI — inspect indexed chain state in a SQLite store.
//!
//! Usage:
//! ```bash
//! stakeindex status  --db chain.db
//! stakeindex balance --db chain.db <ADDRESS>
//! stakeindex ticket  --db chain.db <TICKET_HASH>
//! stakeindex info
//! ```

use std::env;
use std::process;

use tracing_subscriber::EnvFilter;

use stakeindex_core::ChainStore;
use stakeindex_storage::sqlite::SqliteStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "status" => cmd_status(&args[2..]).await,
        "balance" => cmd_balance(&args[2..]).await,
        "ticket" => cmd_ticket(&args[2..]).await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("stakeindex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("stakeindex {}", env!("CARGO_PKG_VERSION"));
    println!("Reorg-safe block and stake-transaction indexer\n");
    println!("USAGE:");
    println!("    stakeindex <COMMAND> [--db FILE] [ARGS]\n");
    println!("COMMANDS:");
    println!("    status   Show best block and chain classification summary");
    println!("    balance  Show the indexed balance of an address");
    println!("    ticket   Show the spend and pool status of a ticket");
    println!("    info     Show build configuration");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    println!("StakeIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Validity cascade depth: 1 block");
    println!("  Votes per block: 5");
    println!("  Ticket maturity: 256 blocks");
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
}

/// Pull `--db FILE` out of the argument list, returning the store and the
/// remaining positional arguments.
async fn open_store(args: &[String]) -> Result<(SqliteStore, Vec<String>), String> {
    let mut db_path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--db" {
            db_path = iter.next().cloned();
        } else {
            rest.push(arg.clone());
        }
    }
    let db_path = db_path.ok_or("missing --db FILE")?;
    let store = SqliteStore::open(&db_path).await.map_err(|e| e.to_string())?;
    Ok((store, rest))
}

async fn cmd_status(args: &[String]) -> Result<(), String> {
    let (store, _) = open_store(args).await?;

    match store.best_block().await {
        Ok((height, hash)) => {
            println!("Best block: {height} ({hash})");
        }
        Err(e) if e.is_not_found() => {
            println!("Best block: none (empty store)");
            return Ok(());
        }
        Err(e) => return Err(e.to_string()),
    }

    let side = store.side_chain_blocks().await.map_err(|e| e.to_string())?;
    println!("Side-chain blocks: {}", side.len());
    for status in side.iter().take(10) {
        println!("  {} (height {})", status.hash, status.height);
    }

    let disapproved = store.disapproved_blocks().await.map_err(|e| e.to_string())?;
    println!("Disapproved blocks: {}", disapproved.len());
    for status in disapproved.iter().take(10) {
        println!("  {} (height {})", status.hash, status.height);
    }
    Ok(())
}

async fn cmd_balance(args: &[String]) -> Result<(), String> {
    let (store, rest) = open_store(args).await?;
    let address = rest.first().ok_or("missing ADDRESS")?;

    let balance = store.address_balance(address).await.map_err(|e| e.to_string())?;
    println!(
        "{}",
        serde_json::to_string_pretty(&balance).map_err(|e| e.to_string())?
    );
    Ok(())
}

async fn cmd_ticket(args: &[String]) -> Result<(), String> {
    let (store, rest) = open_store(args).await?;
    let hash = rest.first().ok_or("missing TICKET_HASH")?;

    let (spend_type, pool_status) = store
        .ticket_status(hash)
        .await
        .map_err(|e| e.to_string())?;
    println!("Ticket {hash}");
    println!("  spend status: {spend_type:?}");
    println!("  pool status:  {pool_status}");
    Ok(())
}
