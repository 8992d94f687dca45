use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, U256};
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use explorer_data::{Block, ChainReader, RpcChainReader};
use explorer_events::{
    AbiRegistry, LogNotifier, SqliteStorage, StoredEvent, SubscriptionOptions, SubscriptionUpdate,
};
use explorer_query::{Explorer, ExplorerConfig};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anvil-explorer")]
#[command(about = "Terminal explorer for a local Ethereum development node")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// SQLite file holding subscriptions and received events.
    #[arg(long, global = true, default_value = "data/explorer.sqlite")]
    db_path: String,

    /// JSON config file; flags and EXPLORER_RPC_URL take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Polling interval for head and event watches, in milliseconds.
    #[arg(long, global = true)]
    polling_ms: Option<u64>,

    /// Contract ABI used to decode logs, as `ADDRESS=PATH` (repeatable).
    #[arg(long = "abi", global = true, value_name = "ADDRESS=PATH")]
    abis: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Latest blocks, newest first.
    Blocks(BlocksArgs),
    /// One block by number.
    Block(BlockArgs),
    /// One transaction with its receipt.
    Tx(TxArgs),
    /// Latest transactions across recent blocks.
    Txs(TxsArgs),
    /// Network summary: block time, TPS, volume, active addresses.
    Stats(StatsArgs),
    /// Gas usage per function selector and top consuming contracts.
    Gas(GasArgs),
    /// Sampled gas usage over a window.
    Trends(TrendsArgs),
    /// Print each new block as it is mined.
    Watch,
    /// Manage contract event subscriptions.
    #[command(subcommand)]
    Events(EventsCommand),
}

#[derive(Args, Debug)]
struct BlocksArgs {
    #[arg(long, default_value_t = 10)]
    count: u64,

    #[arg(long)]
    with_txs: bool,
}

#[derive(Args, Debug)]
struct BlockArgs {
    number: u64,

    #[arg(long)]
    with_txs: bool,
}

#[derive(Args, Debug)]
struct TxArgs {
    hash: String,
}

#[derive(Args, Debug)]
struct TxsArgs {
    /// Blocks to scan back from the head.
    #[arg(long, default_value_t = 10)]
    blocks: u64,

    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Args, Debug)]
struct StatsArgs {
    #[arg(long, default_value_t = 50)]
    window: u64,
}

#[derive(Args, Debug)]
struct GasArgs {
    #[arg(long, default_value_t = 50)]
    blocks: u64,

    #[arg(long, default_value_t = 10)]
    top: usize,
}

#[derive(Args, Debug)]
struct TrendsArgs {
    #[arg(long, default_value_t = 100)]
    blocks: u64,

    #[arg(long, default_value_t = 20)]
    samples: u64,
}

#[derive(Subcommand, Debug)]
enum EventsCommand {
    /// Create a subscription.
    Subscribe(SubscribeArgs),
    /// List subscriptions.
    List,
    Enable { id: String },
    Disable { id: String },
    Delete { id: String },
    /// Show stored events, newest first.
    Log(LogArgs),
    Pin { event_id: String },
    Unpin { event_id: String },
    /// Remove all stored events.
    Clear,
    /// Watch every enabled subscription and print events as they arrive.
    Run,
}

#[derive(Args, Debug)]
struct SubscribeArgs {
    /// Contract address; all contracts when omitted.
    #[arg(long)]
    address: Option<String>,

    /// Decoded event name, matched case-insensitively.
    #[arg(long)]
    event: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    notify: bool,

    /// Create the subscription without starting it.
    #[arg(long)]
    disabled: bool,
}

#[derive(Args, Debug)]
struct LogArgs {
    #[arg(long)]
    subscription: Option<String>,

    #[arg(long)]
    pinned: bool,

    #[arg(long, default_value_t = 25)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let explorer = build_explorer(&cli).await?;

    let result = match cli.command {
        Commands::Blocks(args) => handle_blocks(&explorer, args).await,
        Commands::Block(args) => handle_block(&explorer, args).await,
        Commands::Tx(args) => handle_tx(&explorer, args).await,
        Commands::Txs(args) => handle_txs(&explorer, args).await,
        Commands::Stats(args) => handle_stats(&explorer, args).await,
        Commands::Gas(args) => handle_gas(&explorer, args).await,
        Commands::Trends(args) => handle_trends(&explorer, args).await,
        Commands::Watch => handle_watch(&explorer).await,
        Commands::Events(command) => handle_events(&explorer, command).await,
    };

    explorer.shutdown();
    result
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn build_explorer(cli: &Cli) -> Result<Explorer<RpcChainReader>> {
    let mut config = match &cli.config {
        Some(path) => ExplorerConfig::load(path)?,
        None => ExplorerConfig::from_env(),
    };
    config = config.with_rpc_override(cli.rpc_url.clone());
    if let Some(ms) = cli.polling_ms {
        config.polling_interval = Duration::from_millis(ms.max(1));
    }

    if let Some(parent) = Path::new(&cli.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let storage = SqliteStorage::new(&cli.db_path).wrap_err("failed to open SQLite storage")?;

    let registry = AbiRegistry::new();
    for spec in &cli.abis {
        register_abi(&registry, spec)?;
    }

    let explorer = Explorer::connect(
        config,
        Arc::new(storage),
        Arc::new(registry),
        Arc::new(LogNotifier),
    )
    .await?;

    info!(
        rpc_url = %explorer.config().rpc_url,
        db_path = %cli.db_path,
        "connected"
    );
    Ok(explorer)
}

/// Registers `ADDRESS=PATH`, accepting a bare ABI array or a build artifact
/// with an `abi` field. The contract is named after the file stem.
fn register_abi(registry: &AbiRegistry, spec: &str) -> Result<()> {
    let (address, path) = spec
        .split_once('=')
        .ok_or_else(|| eyre!("invalid --abi {spec:?}, expected ADDRESS=PATH"))?;
    let address: Address = address
        .trim()
        .parse()
        .wrap_err_with(|| format!("invalid contract address in --abi {spec:?}"))?;
    let path = Path::new(path.trim());

    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read ABI file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("failed to parse ABI file {}", path.display()))?;
    let abi = match value.get("abi") {
        Some(abi) => abi.to_string(),
        None => raw,
    };

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned());
    registry.register_json(address, name, &abi)
}

async fn handle_blocks<R: ChainReader>(explorer: &Explorer<R>, args: BlocksArgs) -> Result<()> {
    let blocks = explorer
        .latest_blocks(args.count, args.with_txs)
        .await
        .wrap_err("failed to load latest blocks")?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Block", "Hash", "Age", "Txs", "Gas Used", "Base Fee (gwei)"]);
    for block in &blocks {
        table.add_row(vec![
            block.number.to_string(),
            truncate_hash(&block.hash.to_string()),
            format_timestamp(block.timestamp),
            block.transaction_count().to_string(),
            format!(
                "{} ({:.1}%)",
                block.gas_used,
                utilization(block.gas_used, block.gas_limit)
            ),
            format_gwei(block.base_fee_per_gas),
        ]);
    }

    println!("\n{}\n", table);
    info!(count = blocks.len(), "blocks command completed");
    Ok(())
}

async fn handle_block<R: ChainReader>(explorer: &Explorer<R>, args: BlockArgs) -> Result<()> {
    let block = explorer
        .block(args.number, args.with_txs)
        .await
        .wrap_err_with(|| format!("failed to load block {}", args.number))?
        .ok_or_else(|| eyre!("block {} not found", args.number))?;

    print_block(&block);

    if args.with_txs && !block.transactions.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Hash", "From", "To", "Value (ETH)", "Gas"]);
        for tx in block.transactions.full() {
            table.add_row(vec![
                truncate_hash(&tx.hash.to_string()),
                truncate_hash(&tx.from.to_string()),
                tx.to
                    .map(|to| truncate_hash(&to.to_string()))
                    .unwrap_or_else(|| "contract creation".to_string()),
                format_ether(tx.value),
                tx.gas.to_string(),
            ]);
        }
        println!("{}\n", table);
    }

    Ok(())
}

fn print_block(block: &Block) {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Field", "Value"]);

    table.add_row(vec!["Number", &block.number.to_string()]);
    table.add_row(vec!["Hash", &block.hash.to_string()]);
    table.add_row(vec!["Parent", &block.parent_hash.to_string()]);
    table.add_row(vec!["Timestamp", &format_timestamp(block.timestamp)]);
    table.add_row(vec!["Miner", &block.miner.to_string()]);
    table.add_row(vec!["Transactions", &block.transaction_count().to_string()]);
    table.add_row(vec![
        "Gas Used",
        &format!(
            "{} / {} ({:.2}%)",
            block.gas_used,
            block.gas_limit,
            utilization(block.gas_used, block.gas_limit)
        ),
    ]);
    table.add_row(vec!["Base Fee (gwei)", &format_gwei(block.base_fee_per_gas)]);

    println!("\n{}\n", table);
}

async fn handle_tx<R: ChainReader>(explorer: &Explorer<R>, args: TxArgs) -> Result<()> {
    let (tx, receipt) = tokio::try_join!(
        explorer.transaction(&args.hash),
        explorer.receipt(&args.hash)
    )?;
    let tx = tx.ok_or_else(|| eyre!("transaction {} not found", args.hash))?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Field", "Value"]);

    table.add_row(vec!["Hash", &tx.hash.to_string()]);
    table.add_row(vec!["From", &tx.from.to_string()]);
    table.add_row(vec![
        "To",
        &tx.to
            .map(|to| to.to_string())
            .unwrap_or_else(|| "contract creation".to_string()),
    ]);
    table.add_row(vec!["Value (ETH)", &format_ether(tx.value)]);
    table.add_row(vec!["Nonce", &tx.nonce.to_string()]);
    table.add_row(vec!["Gas Limit", &tx.gas.to_string()]);
    table.add_row(vec!["Selector", &explorer_stats::extract_selector(&tx.input)]);

    match receipt {
        Some(receipt) => {
            table.add_row(vec![
                "Status",
                if receipt.succeeded() { "success" } else { "failed" },
            ]);
            table.add_row(vec![
                "Block",
                &receipt
                    .block_number
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "pending".to_string()),
            ]);
            table.add_row(vec!["Gas Used", &receipt.gas_used.to_string()]);
            let fee = U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price);
            table.add_row(vec!["Fee (ETH)", &format_ether(fee)]);
            if let Some(contract) = receipt.contract_address {
                table.add_row(vec!["Created Contract", &contract.to_string()]);
            }
            table.add_row(vec!["Logs", &receipt.logs.len().to_string()]);
        }
        None => {
            table.add_row(vec!["Status", "pending"]);
        }
    }

    println!("\n{}\n", table);
    Ok(())
}

async fn handle_txs<R: ChainReader>(explorer: &Explorer<R>, args: TxsArgs) -> Result<()> {
    let txs = explorer
        .latest_transactions(args.blocks, args.limit)
        .await
        .wrap_err("failed to load latest transactions")?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Hash", "Block", "Age", "From", "To", "Value (ETH)"]);
    for tx in &txs {
        table.add_row(vec![
            truncate_hash(&tx.transaction.hash.to_string()),
            tx.block_number.to_string(),
            format_timestamp(tx.timestamp),
            truncate_hash(&tx.transaction.from.to_string()),
            tx.transaction
                .to
                .map(|to| truncate_hash(&to.to_string()))
                .unwrap_or_else(|| "contract creation".to_string()),
            format_ether(tx.transaction.value),
        ]);
    }

    println!("\n{}\n", table);
    info!(count = txs.len(), "txs command completed");
    Ok(())
}

async fn handle_stats<R: ChainReader>(explorer: &Explorer<R>, args: StatsArgs) -> Result<()> {
    let pb = spinner("computing network statistics")?;
    let (network, volume, active) = tokio::try_join!(
        explorer.network_stats(args.window),
        explorer.transaction_volume(args.window),
        explorer.active_addresses(args.window),
    )?;
    pb.finish_and_clear();

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);

    table.add_row(vec!["Latest Block", &network.latest_block.to_string()]);
    table.add_row(vec!["Latest Timestamp", &format_timestamp(network.latest_timestamp)]);
    table.add_row(vec![
        "Window",
        &format!("{} - {}", volume.start_block, volume.end_block),
    ]);
    table.add_row(vec![
        "Average Block Time",
        &format!("{:.2} s", network.average_block_time),
    ]);
    table.add_row(vec!["TPS", &format!("{:.3}", network.tps)]);
    table.add_row(vec!["Base Fee (gwei)", &format_gwei(network.base_fee_per_gas)]);
    table.add_row(vec![
        "Head Gas Utilization",
        &format!("{:.2}%", network.gas_utilization_percent),
    ]);
    table.add_row(vec!["Transactions", &volume.transaction_count.to_string()]);
    table.add_row(vec![
        "Transactions / Block",
        &format!("{:.2}", volume.average_transactions_per_block),
    ]);
    table.add_row(vec!["Contract Creations", &volume.contract_creations.to_string()]);
    table.add_row(vec!["Total Value (ETH)", &format_ether(volume.total_value)]);
    table.add_row(vec!["Average Value (ETH)", &format_ether(volume.average_value)]);
    table.add_row(vec!["Active Addresses", &active.total_active.to_string()]);
    table.add_row(vec!["Unique Senders", &active.unique_senders.to_string()]);
    table.add_row(vec!["Unique Receivers", &active.unique_receivers.to_string()]);

    println!("\n{}\n", table);
    Ok(())
}

async fn handle_gas<R: ChainReader>(explorer: &Explorer<R>, args: GasArgs) -> Result<()> {
    let pb = spinner("profiling gas usage")?;
    let (stats, consumers) = tokio::try_join!(
        explorer.gas_statistics(args.blocks),
        explorer.top_gas_consumers(args.blocks, args.top),
    )?;
    pb.finish_and_clear();

    let mut summary = Table::new();
    summary.load_preset(UTF8_BORDERS_ONLY);
    summary.set_header(vec!["Metric", "Value"]);
    summary.add_row(vec![
        "Window",
        &format!("{} - {}", stats.start_block, stats.end_block),
    ]);
    summary.add_row(vec!["Transactions", &stats.transaction_count.to_string()]);
    summary.add_row(vec!["Total Gas Used", &stats.total_gas_used.to_string()]);
    summary.add_row(vec![
        "Average Gas / Tx",
        &stats.average_gas_per_transaction.to_string(),
    ]);
    summary.add_row(vec![
        "Average Gas Price (gwei)",
        &format_gwei(Some(stats.average_gas_price.saturating_to::<u128>())),
    ]);
    summary.add_row(vec!["Fees Paid (ETH)", &format_ether(stats.total_fees_paid)]);
    summary.add_row(vec![
        "Failed Transactions",
        &format!("{} ({} gas)", stats.failed_transactions, stats.failed_gas_used),
    ]);
    summary.add_row(vec![
        "Average Utilization",
        &format!("{:.2}%", stats.average_utilization_percent),
    ]);
    println!("\n{}\n", summary);

    let mut functions = Table::new();
    functions.load_preset(UTF8_BORDERS_ONLY);
    functions.set_header(vec!["Selector", "Calls", "Total Gas", "Avg", "Min", "Max", "Share"]);
    for function in stats.functions.iter().take(args.top) {
        functions.add_row(vec![
            function.selector.clone(),
            function.call_count.to_string(),
            function.total_gas.to_string(),
            function.average_gas.to_string(),
            function.min_gas.to_string(),
            function.max_gas.to_string(),
            format!("{:.2}%", function.share_percent),
        ]);
    }
    println!("{}\n", functions);

    let mut contracts = Table::new();
    contracts.load_preset(UTF8_BORDERS_ONLY);
    contracts.set_header(vec!["Contract", "Txs", "Total Gas", "Avg Gas", "Share"]);
    for consumer in &consumers {
        contracts.add_row(vec![
            consumer.address.to_string(),
            consumer.transaction_count.to_string(),
            consumer.total_gas.to_string(),
            consumer.average_gas.to_string(),
            format!("{:.2}%", consumer.share_percent),
        ]);
    }
    println!("{}\n", contracts);

    Ok(())
}

async fn handle_trends<R: ChainReader>(explorer: &Explorer<R>, args: TrendsArgs) -> Result<()> {
    let pb = spinner("sampling gas trends")?;
    let points = explorer.gas_trends(args.blocks, args.samples).await?;
    pb.finish_and_clear();

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Block",
        "Time",
        "Txs",
        "Gas Used",
        "Utilization",
        "Base Fee (gwei)",
        "Avg Price (gwei)",
    ]);
    for point in &points {
        table.add_row(vec![
            point.block_number.to_string(),
            format_timestamp(point.timestamp),
            point.transaction_count.to_string(),
            point.gas_used.to_string(),
            format!("{:.2}%", point.utilization_percent),
            format_gwei(point.base_fee_per_gas),
            format_gwei(Some(point.average_gas_price.saturating_to::<u128>())),
        ]);
    }

    println!("\n{}\n", table);
    Ok(())
}

async fn handle_watch<R: ChainReader>(explorer: &Explorer<R>) -> Result<()> {
    let _follow = explorer.follow_head();
    let mut heads = explorer.head().subscribe();
    info!(
        interval_ms = explorer.head().polling_interval().as_millis() as u64,
        "watching for new blocks, ctrl-c to stop"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            head = heads.next() => {
                let Some(number) = head else { break };
                match explorer.block(number, false).await {
                    Ok(Some(block)) => println!(
                        "#{} {} txs={} gas={} ({:.1}%) base_fee={} gwei",
                        block.number,
                        truncate_hash(&block.hash.to_string()),
                        block.transaction_count(),
                        block.gas_used,
                        utilization(block.gas_used, block.gas_limit),
                        format_gwei(block.base_fee_per_gas),
                    ),
                    Ok(None) => println!("#{number} (not yet available)"),
                    Err(e) => tracing::warn!(block_number = number, error = %e, "failed to load new head"),
                }
            }
        }
    }

    Ok(())
}

async fn handle_events<R: ChainReader>(
    explorer: &Explorer<R>,
    command: EventsCommand,
) -> Result<()> {
    let events = explorer.events();

    match command {
        EventsCommand::Subscribe(args) => {
            let subscription = events.subscribe(SubscriptionOptions {
                address: args.address,
                event_name: args.event,
                enabled: !args.disabled,
                notify_on_event: args.notify,
                contract_name: args.name,
            })?;
            println!("created {}", subscription.id);
        }
        EventsCommand::List => {
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec![
                "Id", "Contract", "Event", "Enabled", "Notify", "Events", "Last Event",
            ]);
            for sub in events.get_all_subscriptions()? {
                table.add_row(vec![
                    sub.id.clone(),
                    sub.contract_name
                        .clone()
                        .or_else(|| sub.address.map(|a| a.to_string()))
                        .unwrap_or_else(|| "any".to_string()),
                    sub.event_name.clone().unwrap_or_else(|| "*".to_string()),
                    sub.enabled.to_string(),
                    sub.notify_on_event.to_string(),
                    sub.event_count.to_string(),
                    sub.last_event_at
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("\n{}\n", table);
        }
        EventsCommand::Enable { id } => set_enabled(explorer, &id, true)?,
        EventsCommand::Disable { id } => set_enabled(explorer, &id, false)?,
        EventsCommand::Delete { id } => {
            if !events.delete_subscription(&id)? {
                return Err(eyre!("no subscription with id {id}"));
            }
            println!("deleted {id}");
        }
        EventsCommand::Log(args) => {
            let stored = match (&args.subscription, args.pinned) {
                (_, true) => events.pinned_events()?,
                (Some(id), false) => events.events_for(id)?,
                (None, false) => events.events()?,
            };
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Received", "Block", "Contract", "Event", "Args", "Id"]);
            for event in stored.iter().take(args.limit) {
                table.add_row(event_row(event));
            }
            println!("\n{}\n", table);
        }
        EventsCommand::Pin { event_id } => events.pin_event(&event_id)?,
        EventsCommand::Unpin { event_id } => events.unpin_event(&event_id)?,
        EventsCommand::Clear => {
            events.clear_events()?;
            println!("event log cleared");
        }
        EventsCommand::Run => {
            let mut received = events.listen();
            let running = events.start_all()?;
            info!(watches = running, "event watches running, ctrl-c to stop");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = received.recv() => match event {
                        Ok(event) => println!("{}", event_row(&event).join("  ")),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event printer fell behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            events.stop_all();
        }
    }

    Ok(())
}

fn set_enabled<R: ChainReader>(explorer: &Explorer<R>, id: &str, enabled: bool) -> Result<()> {
    let update = SubscriptionUpdate {
        enabled: Some(enabled),
        ..SubscriptionUpdate::default()
    };
    explorer
        .events()
        .update_subscription(id, update)?
        .ok_or_else(|| eyre!("no subscription with id {id}"))?;
    println!("{} {id}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn event_row(event: &StoredEvent) -> Vec<String> {
    let args = event
        .decoded
        .as_ref()
        .map(|decoded| {
            decoded
                .args
                .iter()
                .map(|arg| format!("{}={}", arg.name, arg.value))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_else(|| format!("{} topics", event.log.topics.len()));

    vec![
        event.received_at.format("%H:%M:%S").to_string(),
        event
            .log
            .block_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string()),
        event
            .contract_name
            .clone()
            .unwrap_or_else(|| truncate_hash(&event.log.address.to_string())),
        event.event_name().unwrap_or("(raw)").to_string(),
        args,
        event.id.clone(),
    ]
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn utilization(gas_used: u64, gas_limit: u64) -> f64 {
    explorer_stats::ratio_percent(U256::from(gas_used), U256::from(gas_limit))
}

fn format_gwei(wei: Option<u128>) -> String {
    wei.map(|wei| format!("{:.3}", wei as f64 / 1e9))
        .unwrap_or_else(|| "-".to_string())
}

fn format_timestamp(timestamp: u64) -> String {
    chrono::DateTime::from_timestamp(timestamp as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Truncate a hex hash/address for compact table display.
fn truncate_hash(hash: &str) -> String {
    if hash.len() > 14 {
        format!("{}…{}", &hash[..8], &hash[hash.len() - 4..])
    } else {
        hash.to_string()
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .wrap_err_with(|| format!("failed to create data directory {}", path.display()))?;
    Ok(())
}
