use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use ethgate::chain::ChainAccessor;
use ethgate::config::{self, Config};
use ethgate::core::{MessageQueue, NotifyLevel};
use ethgate::domain::{BlockTag, LogQuery, TokenDescriptor};
use ethgate::infrastructure::abi::{
    find_function, format_value, parse_abi, parse_arguments, token_abi,
};
use ethgate::logging::setup_logging;
use ethgate::modules::gitcoin::{GitcoinDataImporter, NoPriceHistorian};
use ethgate::store::SqliteLedgerStore;

#[derive(Debug, Parser)]
#[command(
    name = "ethgate",
    version,
    about = "Read-only Ethereum access through a local node or Etherscan"
)]
struct Args {
    /// HTTP JSON-RPC endpoint (e.g. http://localhost:8545)
    #[arg(long, global = true)]
    rpc: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Accept any chain and skip the sync check
    #[arg(long, global = true)]
    no_mainnet_check: bool,

    /// Never connect to a node; use Etherscan only
    #[arg(long, global = true)]
    offline: bool,

    /// Etherscan API key
    #[arg(long, global = true)]
    etherscan_key: Option<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show which backend queries go through
    Status,

    /// Ether balance of one or more accounts
    Balance {
        #[arg(required = true)]
        addresses: Vec<Address>,
    },

    /// Token balance of one or more accounts
    TokenBalance {
        /// Configured token symbol or token contract address
        #[arg(long)]
        token: String,

        /// Decimals for a token that is not in the config file
        #[arg(long)]
        decimals: Option<u8>,

        #[arg(required = true)]
        addresses: Vec<Address>,
    },

    /// Deployed bytecode of an account
    Code { address: Address },

    /// Call a read-only contract method
    Call {
        /// JSON ABI file; the bundled ERC-20 ABI when omitted
        #[arg(long)]
        abi: Option<PathBuf>,

        contract: Address,

        method: String,

        args: Vec<String>,
    },

    /// Event logs of a contract (node only)
    Logs {
        /// JSON ABI file; the bundled ERC-20 ABI when omitted
        #[arg(long)]
        abi: Option<PathBuf>,

        contract: Address,

        event: String,

        #[arg(long, default_value_t = 0)]
        from: u64,

        /// Block number or "latest"
        #[arg(long, default_value = "latest")]
        to: BlockTag,

        /// Indexed argument filter, NAME=VALUE
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Block by number (node only)
    Block { number: u64 },

    /// Import a Gitcoin grants CSV export into the local ledger
    ImportGitcoin {
        csv: PathBuf,

        /// Ledger database; defaults to the data directory
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log)?;

    let mut config = config::load();
    apply_overrides(&args, &mut config);

    let messages = Arc::new(MessageQueue::new());
    let result = run(args, config, messages.clone()).await;

    for notification in messages.drain() {
        let level = match notification.level {
            NotifyLevel::Warn => "warning",
            NotifyLevel::Error => "error",
        };
        eprintln!("{}: {}", level, notification.message);
    }
    result
}

fn apply_overrides(args: &Args, config: &mut Config) {
    if let Some(rpc) = &args.rpc {
        config.rpc_endpoint = rpc.clone();
    }
    if let Some(timeout) = args.timeout {
        config.rpc_timeout_secs = timeout;
    }
    if args.no_mainnet_check {
        config.mainnet_check = false;
    }
    if let Some(key) = &args.etherscan_key {
        config.explorer.api_key = Some(key.clone());
    }
}

async fn run(args: Args, config: Config, messages: Arc<MessageQueue>) -> Result<()> {
    if let Command::ImportGitcoin { csv, db } = &args.command {
        return import_gitcoin(&config, csv, db.clone(), messages).await;
    }

    let mut accessor = ChainAccessor::from_config(&config, messages)?;
    if !args.offline {
        let outcome = accessor
            .attempt_connect(&config.rpc_endpoint, config.mainnet_check)
            .await;
        if !outcome.connected && !outcome.message.is_empty() {
            eprintln!("{}", outcome.message);
        }
    }

    match args.command {
        Command::Status => {
            let backend = accessor.backend();
            println!("backend: {}", backend.name());
            println!("endpoint: {}", accessor.node().endpoint());
            println!("state: {:?}", accessor.node().state());
        }
        Command::Balance { addresses } => {
            if let [address] = addresses.as_slice() {
                println!("{} {}", address, accessor.get_balance(*address).await?);
            } else {
                let balances = accessor.get_balances(&addresses).await?;
                for address in &addresses {
                    match balances.get(address) {
                        Some(balance) => println!("{} {}", address, balance),
                        None => println!("{} unknown", address),
                    }
                }
            }
        }
        Command::TokenBalance {
            token,
            decimals,
            addresses,
        } => {
            let token = resolve_token(&config, &token, decimals)?;
            if let [address] = addresses.as_slice() {
                let amount = accessor.get_token_balance(&token, *address).await?;
                println!("{} {} {}", address, amount, token.symbol);
            } else {
                let balances = accessor.get_token_balances(&token, &addresses).await?;
                for (address, amount) in balances {
                    println!("{} {} {}", address, amount, token.symbol);
                }
            }
        }
        Command::Code { address } => {
            println!("{}", accessor.get_code(address).await?);
        }
        Command::Call {
            abi,
            contract,
            method,
            args,
        } => {
            let abi = load_abi(abi.as_ref())?;
            let function = find_function(&abi, &method, args.len())?;
            let arguments = parse_arguments(function, &args)?;
            let value = accessor
                .call_contract_method(contract, &abi, &method, &arguments)
                .await?;
            println!("{}", format_value(&value));
        }
        Command::Logs {
            abi,
            contract,
            event,
            from,
            to,
            filters,
        } => {
            let abi = load_abi(abi.as_ref())?;
            let mut query = LogQuery::new(contract, abi, event).from_block(from).to_block(to);
            query.argument_filters = parse_filters(&filters)?;
            let logs = accessor.get_logs(&query).await?;
            for log in &logs {
                println!("{}", serde_json::to_string(log)?);
            }
            eprintln!("{} log(s)", logs.len());
        }
        Command::Block { number } => match accessor.get_block_by_number(number).await? {
            Some(block) => println!("{}", serde_json::to_string_pretty(&block)?),
            None => bail!("block {} unavailable without a connected node", number),
        },
        // Runs before any connection attempt
        Command::ImportGitcoin { .. } => {}
    }

    Ok(())
}

async fn import_gitcoin(
    config: &Config,
    csv: &Path,
    db: Option<PathBuf>,
    messages: Arc<MessageQueue>,
) -> Result<()> {
    let db_path = db
        .or_else(|| config.ledger_db_path())
        .context("no ledger database path; pass --db")?;
    let store = SqliteLedgerStore::open(&db_path)?;
    let importer = GitcoinDataImporter::new(
        store,
        Arc::new(config.asset_resolver()),
        Arc::new(NoPriceHistorian),
        messages,
    );
    let summary = importer.import_gitcoin_csv(csv).await?;
    println!(
        "parsed {} skipped {} duplicates {} inserted {}",
        summary.parsed, summary.skipped, summary.duplicates, summary.inserted
    );
    Ok(())
}

fn resolve_token(config: &Config, token: &str, decimals: Option<u8>) -> Result<TokenDescriptor> {
    if let Some(mut descriptor) = config.find_token(token)? {
        if let Some(decimals) = decimals {
            descriptor.decimals = decimals;
        }
        return Ok(descriptor);
    }
    let address: Address = token
        .parse()
        .with_context(|| format!("unknown token '{}'; add it to the config or pass its address", token))?;
    Ok(TokenDescriptor::new(address, decimals.unwrap_or(18), token))
}

fn load_abi(path: Option<&PathBuf>) -> Result<alloy_json_abi::JsonAbi> {
    match path {
        Some(path) => {
            let content =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            Ok(parse_abi(&content)?)
        }
        None => Ok(token_abi()?.clone()),
    }
}

fn parse_filters(filters: &[String]) -> Result<BTreeMap<String, String>> {
    filters
        .iter()
        .map(|filter| match filter.split_once('=') {
            Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
            None => bail!("filter '{}' is not NAME=VALUE", filter),
        })
        .collect()
}
