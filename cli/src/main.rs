mod config;
mod genesis;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use obscura_core::chain::ChainManager;
use obscura_network::host::{Core, Host};
use obscura_network::message::Message;
use obscura_wallet::Wallet;

use crate::config::FileConfig;

#[derive(Parser)]
#[command(name = "obscura")]
#[command(about = "Obscura blockchain CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full node: opens (or mints) the genesis block, starts the
    /// peer network, and serves the chain to connected peers.
    Node {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a standalone miner: repeatedly drains the mempool into a block
    /// and mines it against the node's local chain.
    Miner {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Hex-encoded 20-byte coinbase address credited with block rewards.
        #[arg(long)]
        coinbase: String,
        /// Stop after mining this many blocks (0 = run forever).
        #[arg(long, default_value_t = 0)]
        max_blocks: u64,
    },
    /// Wallet operations.
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Generates a new keypair and prints its address and secret.
    Generate,
    /// Derives and prints the address for a hex-encoded secret key.
    Address {
        #[arg(long)]
        secret: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn load_file_config(path: &Option<PathBuf>) -> anyhow::Result<FileConfig> {
    match path {
        Some(path) => FileConfig::load(path),
        None => Ok(FileConfig::default()),
    }
}

fn open_chain(file_config: &FileConfig) -> anyhow::Result<Arc<ChainManager>> {
    let core_config = file_config.core_config();
    let genesis = genesis::load_or_default(file_config.genesis_path.as_deref(), &core_config)?;
    info!(hash = %hex::encode(genesis.hash()), "using genesis block");
    Ok(Arc::new(ChainManager::new(core_config, genesis)?))
}

fn parse_address(hex_str: &str) -> anyhow::Result<obscura_core::Address> {
    let bytes = hex::decode(hex_str)?;
    let array: [u8; 20] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("address must be exactly 20 bytes"))?;
    Ok(array)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Node { config } => run_node(config).await,
        Commands::Miner { config, coinbase, max_blocks } => run_miner(config, coinbase, max_blocks).await,
        Commands::Wallet { action } => run_wallet(action),
    }
}

async fn run_node(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let file_config = load_file_config(&config_path)?;
    let chain = open_chain(&file_config)?;

    let net_config = file_config.net_config()?;
    let host = Host::new(net_config, Core::new(chain.clone()));
    host.run().await?;

    info!("node started, awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

async fn run_miner(config_path: Option<PathBuf>, coinbase_hex: String, max_blocks: u64) -> anyhow::Result<()> {
    let file_config = load_file_config(&config_path)?;
    let chain = open_chain(&file_config)?;
    let coinbase = parse_address(&coinbase_hex)?;
    let core_config = file_config.core_config();

    let net_config = file_config.net_config()?;
    let host = Host::new(net_config, Core::new(chain.clone()));
    host.clone().run().await?;

    let mut mined = 0u64;
    loop {
        let pending = chain.drain_mempool(256);
        let txs = obscura_core::block::TransactionsSet::from_vec(pending)?;
        let block = obscura_core::block::Block::new(
            chain.top_block_depth() + 1,
            chain.top_block_hash(),
            coinbase,
            txs,
        );
        let mined_block = tokio::task::spawn_blocking({
            let target = core_config.pow_target;
            move || block.mine(&target)
        })
        .await?;

        info!(hash = %hex::encode(mined_block.hash()), depth = mined_block.depth, "mined block");
        chain.try_add_block(mined_block.clone())?;
        host.broadcast(Message::Block(mined_block));

        mined += 1;
        if max_blocks != 0 && mined >= max_blocks {
            break;
        }
    }
    Ok(())
}

fn run_wallet(action: WalletAction) -> anyhow::Result<()> {
    match action {
        WalletAction::Generate => {
            let wallet = Wallet::generate();
            println!("address: {}", wallet.address_base58());
            println!("secret:  {}", wallet.to_secret_hex());
        }
        WalletAction::Address { secret } => {
            let wallet = Wallet::from_secret_hex(&secret)?;
            println!("address: {}", wallet.address_base58());
        }
    }
    Ok(())
}
