use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use confess_app::config::{network_name, AppConfig};
use alloy_signer_local::PrivateKeySigner;
use confess_app::contract::{Confession, LikeOutcome, RpcConfessionContract};
use confess_app::session::ConfessSession;
use confess_app::simulated::{simulated_address, SimulatedConfessionContract};
use fhevm_client::config::{MockChainConfig, LOCAL_RPC_URL};
use fhevm_client::factory::InstanceFactory;
use fhevm_client::lifecycle::{InstanceLifecycle, LifecycleStatus};
use fhevm_client::loader::SdkLoader;
use fhevm_client::mock::MockInstance;
use fhevm_client::network::{Connectivity, HttpJsonRpc, NetworkContext, NetworkReader};

#[derive(Parser)]
#[command(name = "chainconfess", about = "Anonymous confessions on an fhEVM chain")]
struct Cli {
    /// JSON-RPC endpoint of the chain
    #[arg(long, env = "CHAINCONFESS_RPC_URL", default_value = LOCAL_RPC_URL)]
    rpc_url: String,

    /// Chain id (queried from the node when omitted)
    #[arg(long, env = "CHAINCONFESS_CHAIN_ID")]
    chain_id: Option<u64>,

    /// Private key of the posting account
    #[arg(long, env = "CHAINCONFESS_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Address book JSON ({"<chainId>": {"address": "0x…"}})
    #[arg(long, env = "CHAINCONFESS_ADDRESSES")]
    addresses: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show network, account and instance status
    Status,
    /// Public confessions
    Feed,
    /// Confessions you sent or received
    Mine,
    /// Most liked public confessions
    Top {
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Post a confession
    Post {
        message: String,
        /// Send privately to this address instead of posting publicly
        #[arg(long)]
        to: Option<String>,
    },
    /// Like a confession
    Like { id: u64 },
    /// Unlock a private confession addressed to you
    Unlock { id: u64 },
    /// Decrypt the like counter of a confession
    Likes { id: u64 },
    /// Walk through post, like, unlock and decrypt against an in-process
    /// simulated chain; nothing is sent to the RPC endpoint
    Demo,
}

fn print_confession(session: &ConfessSession, c: &Confession) {
    let avatar = session.avatar(c);
    let audience = if c.is_public() {
        "public".to_owned()
    } else {
        format!("private -> {}", c.recipient)
    };
    println!("#{} [{}] {} at {}", c.id, avatar.initial, audience, c.timestamp);
    match session.message_text(c) {
        Some(text) => println!("    {text}"),
        None => println!("    (private, unlock to read)"),
    }
}

fn print_feed(session: &ConfessSession, feed: &[Confession], empty: &str) {
    if feed.is_empty() {
        println!("{empty}");
    }
    for c in feed {
        print_confession(session, c);
    }
}

/// Everything runs in this process: a simulated contract on a simulated
/// backend, the configured account plus one random second account.
async fn run_demo(signer: Arc<PrivateKeySigner>) -> anyhow::Result<()> {
    let mock = Arc::new(MockInstance::new(MockChainConfig::default()));
    let deployer = signer.address();
    let deployment =
        SimulatedConfessionContract::deploy(mock.clone(), simulated_address(deployer), deployer);
    let session_for = |signer: Arc<PrivateKeySigner>| {
        let contract = Arc::new(deployment.as_account(signer.address()));
        ConfessSession::new(mock.clone(), contract, signer)
    };

    let friend_signer = Arc::new(PrivateKeySigner::random());
    let friend_address = friend_signer.address();
    let me = session_for(signer);
    let friend = session_for(friend_signer);

    me.post("I still sleep with a night light", true, None).await?;
    let to = friend_address.to_string();
    me.post("I borrowed your bike and never told you", false, Some(&to))
        .await?;
    friend.like(1).await?;
    friend.unlock(2).await?;

    println!("public feed:");
    print_feed(&me, &me.public_feed().await?, "No public confessions yet.");
    println!("#1: {} like(s)", me.likes(1).await?);
    println!("inbox of {friend_address}:");
    print_feed(&friend, &friend.my_feed().await?, "Empty inbox.");
    println!("#2: {} like(s)", friend.likes(2).await?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = AppConfig {
        rpc_url: cli.rpc_url,
        chain_id: cli.chain_id,
        private_key: cli.private_key,
        addresses: cli.addresses,
    };
    let signer = Arc::new(config.signer()?);
    let account = signer.address();
    if let Command::Demo = cli.command {
        return run_demo(signer).await;
    }

    let reader: Arc<dyn NetworkReader> = Arc::new(HttpJsonRpc::new(config.rpc_url.clone()));
    let chain_id = match config.chain_id {
        Some(id) => id,
        None => reader
            .chain_id()
            .await
            .with_context(|| format!("cannot reach {}", config.rpc_url))?,
    };

    let factory = Arc::new(InstanceFactory::new(SdkLoader::global()));
    let lifecycle = InstanceLifecycle::new(factory);
    lifecycle.set_context(NetworkContext::new(
        Connectivity::Provider(reader.clone()),
        Some(chain_id),
    ));
    let snapshot = lifecycle.wait_settled().await;

    let contract_address = config.address_book()?.lookup(chain_id);

    if let Command::Status = cli.command {
        println!("network:  {} ({chain_id})", network_name(Some(chain_id)));
        println!("account:  {account}");
        match contract_address {
            Some(addr) => println!("contract: {addr}"),
            None => println!("contract: not deployed"),
        }
        match (&snapshot.status, &snapshot.error) {
            (LifecycleStatus::Error, Some(e)) => println!("fhevm:    error ({e})"),
            (status, _) => println!("fhevm:    {status:?}"),
        }
        return Ok(());
    }

    let instance = match snapshot.instance {
        Some(instance) => instance,
        None => match snapshot.error {
            Some(e) => bail!("fhEVM instance unavailable: {e}"),
            None => bail!("fhEVM instance unavailable"),
        },
    };
    let Some(contract_address) = contract_address else {
        bail!(confess_app::AppError::NoContract(chain_id));
    };
    let contract = Arc::new(RpcConfessionContract::new(reader, contract_address, account));
    let session = ConfessSession::new(instance, contract, signer);

    match cli.command {
        Command::Status | Command::Demo => {}
        Command::Feed => {
            let feed = session.public_feed().await?;
            print_feed(&session, &feed, "No public confessions yet.");
        }
        Command::Mine => {
            let feed = session.my_feed().await?;
            print_feed(&session, &feed, "No confessions involving you yet.");
        }
        Command::Top { limit } => {
            let feed = session.top_feed(limit).await?;
            print_feed(&session, &feed, "No popular confessions yet.");
        }
        Command::Post { message, to } => {
            let receipt = session.post(&message, to.is_none(), to.as_deref()).await?;
            println!("posted in {}", receipt.tx_hash);
        }
        Command::Like { id } => match session.like(id).await? {
            LikeOutcome::Liked => println!("liked #{id}"),
            LikeOutcome::AlreadyLiked => println!("you already liked #{id}"),
        },
        Command::Unlock { id } => {
            session.unlock(id).await?;
            let confession = session.confession(id).await?;
            print_confession(&session, &confession);
        }
        Command::Likes { id } => {
            let likes = session.likes(id).await?;
            println!("#{id}: {likes} like(s)");
        }
    }

    lifecycle.shutdown();
    Ok(())
}
