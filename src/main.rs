use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use eyre::OptionExt;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use xchain_agent::{
    devnet::Devnet,
    tools::{self, Tool},
    xcm::scale_amount,
    AgentConfig, TransferRequest, XChainAgent,
};

/// Runs agent operations against an in-process relay/parachain devnet.
#[derive(Parser)]
#[command(name = "xchain-agent", version)]
struct Args {
    /// TOML file with chains, retry and bootstrap settings. Defaults to Westend.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Hex-encoded secret key of the agent account.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Hex-encoded secret key of the delegate account.
    #[arg(long, env = "DELEGATE_PRIVATE_KEY", hide_env_values = true)]
    delegate_private_key: Option<String>,

    /// Tokens credited to the agent on every devnet chain at start.
    #[arg(long, default_value = "100")]
    fund: Decimal,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the agent and delegate addresses.
    Address,
    /// Free balance on one chain, or on all of them.
    Balance { chain: Option<String> },
    /// Proxy records of the agent account.
    Proxies { chain: String },
    /// Teleport between a relay chain and a parachain.
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: Decimal,
        /// Defaults to the agent's own address.
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Grant a proxy. Defaults to the configured delegate.
    AddProxy { chain: String, delegate: Option<String> },
    /// Revoke a proxy. Defaults to the configured delegate.
    RemoveProxy { chain: String, delegate: Option<String> },
    /// List the chat tools and their parameters.
    Tools,
    /// Invoke a chat tool with JSON parameters.
    Tool { name: String, params: String },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    }
    .with_credentials(args.private_key.clone(), args.delegate_private_key.clone());

    let devnet = Devnet::new(&config.chains);
    let agent = Arc::new(XChainAgent::launch(config, Arc::new(devnet.clone())).await?);
    if args.fund > Decimal::ZERO {
        for chain in agent.chains().iter() {
            let amount = scale_amount(args.fund, chain.decimals)?;
            devnet.endow(&chain.name, &agent.identity().account(), amount);
        }
    }

    let result = run(&agent, args.command).await;
    agent.disconnect_all().await;
    result
}

async fn run(agent: &Arc<XChainAgent>, command: Command) -> eyre::Result<()> {
    match command {
        Command::Address => {
            println!("address: {}", agent.address());
            if let Some(delegate) = agent.delegate_address() {
                println!("delegate: {delegate}");
            }
        }
        Command::Balance { chain: Some(chain) } => {
            println!("{chain}: {}", agent.check_balance(&chain).await?);
        }
        Command::Balance { chain: None } => {
            for (chain, balance) in agent.check_balances().await {
                match balance {
                    Ok(balance) => println!("{chain}: {balance}"),
                    Err(err) => println!("{chain}: error: {err}"),
                }
            }
        }
        Command::Proxies { chain } => {
            let proxies = agent.check_proxies(&chain).await?;
            if proxies.is_empty() {
                println!("no proxies on {chain}");
            }
            let prefix = agent.identity().ss58_prefix();
            for proxy in proxies {
                println!(
                    "{} {:?} delay={}",
                    proxy.delegate.to_ss58(prefix),
                    proxy.proxy_type,
                    proxy.delay
                );
            }
        }
        Command::Transfer {
            from,
            to,
            amount,
            recipient,
        } => {
            let request = TransferRequest {
                source_chain: from,
                destination_chain: to,
                amount,
                recipient: recipient.unwrap_or_else(|| agent.address().to_string()),
            };
            let outcome = agent.transfer(&request).await?;
            println!("teleport included: {outcome}");
        }
        Command::AddProxy { chain, delegate } => {
            let delegate = delegate_or_default(agent, delegate)?;
            let outcome = agent.create_proxy(&chain, &delegate).await?;
            println!("proxy added: {outcome}");
        }
        Command::RemoveProxy { chain, delegate } => {
            let delegate = delegate_or_default(agent, delegate)?;
            let outcome = agent.remove_proxy(&chain, &delegate).await?;
            println!("proxy removed: {outcome}");
        }
        Command::Tools => {
            for tool in tools::all(agent.clone()) {
                println!("{}: {}", tool.name(), tool.description());
                println!("  {}", tool.parameters_schema());
            }
        }
        Command::Tool { name, params } => {
            let tool = tools::all(agent.clone())
                .into_iter()
                .find(|t| t.name() == name)
                .ok_or_eyre(format!("no tool named {name}"))?;
            let params = serde_json::from_str(&params)?;
            println!("{}", tool.execute(params).await?.content);
        }
    }
    Ok(())
}

fn delegate_or_default(agent: &XChainAgent, delegate: Option<String>) -> eyre::Result<String> {
    match delegate {
        Some(delegate) => Ok(delegate),
        None => agent
            .delegate_address()
            .map(str::to_string)
            .ok_or_eyre("no delegate given and DELEGATE_PRIVATE_KEY is not set"),
    }
}
