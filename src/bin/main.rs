//! Swapverse CLI - session and history against a JSON-RPC node
//!
//! The node stands in for the injected wallet: its unlocked accounts are the
//! wallet accounts and it signs `eth_sendTransaction` itself (anvil/hardhat).
//! Connecting requires the node to report the required chain, e.g.
//! `anvil --chain-id 11155111`; nodes cannot switch chains.
//!
//!   swapverse wallets                    → ["metamask"]
//!   swapverse network                    → {chainId, chainIdHex, name, isRequired}
//!   swapverse history <address>          → [SwapRecord, ...]
//!   swapverse tx <hash>                  → TransactionDetails | null
//!   swapverse connect                    → {address, wallet}
//!   swapverse balance <token>            → {token, balance}
//!   swapverse swap <from> <to> <amount>  → {status, hash, block}
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::rc::Rc;
use swapverse::logging::init_logging;
use swapverse::provider::rpc::DEFAULT_RPC_URL;
use swapverse::{
    FilePreferences, InjectedProvider, ProviderHandle, ProviderRegistry, RpcHost, RpcProvider, SessionConfig,
    TransactionHistoryReader, WalletKind, WalletSession,
};
use tracing::debug;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("swapverse {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let Some(command) = opts.command.clone() else {
        print_usage();
        return;
    };

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")
        .and_then(|rt| rt.block_on(run(&command, &opts)));

    let pretty = opts.pretty || (!opts.json && std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{e:#}")}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    app: Option<String>,
    wallet: Option<String>,
    rpc_url: Option<String>,
    from_block: Option<u64>,
    window: Option<u64>,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--app" | "-a" => {
                    opts.app = value;
                    i += 1;
                }
                "--wallet" | "-w" => {
                    opts.wallet = value;
                    i += 1;
                }
                "--rpc" | "-r" => {
                    opts.rpc_url = value;
                    i += 1;
                }
                "--from-block" => {
                    opts.from_block = value.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "--window" => {
                    opts.window = value.and_then(|v| v.parse().ok());
                    i += 1;
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.positional = positional;

        // Environment variables (lower priority than CLI args)
        if opts.app.is_none() {
            opts.app = env::var("SWAPVERSE_APP").ok().filter(|s| !s.is_empty());
        }
        if opts.wallet.is_none() {
            opts.wallet = env::var("SWAPVERSE_WALLET").ok().filter(|s| !s.is_empty());
        }

        opts
    }

    fn arg(&self, index: usize, name: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing <{name}>"))
    }
}

/// Everything a command needs: the node-backed provider and a session over it.
struct Cli {
    provider: ProviderHandle,
    session: WalletSession,
    kind: WalletKind,
    config: SessionConfig,
}

impl Cli {
    fn open(opts: &ParsedArgs) -> Result<Self> {
        let kind = match opts.wallet.as_deref() {
            Some(name) => name.parse::<WalletKind>()?,
            None => WalletKind::MetaMask,
        };
        let mut config = opts.app.clone().map(SessionConfig::new).unwrap_or_default();
        if let Some(window) = opts.window {
            config = config.with_history_window(window);
        }
        let rpc = match opts.rpc_url.clone() {
            Some(url) => RpcProvider::new(kind, url),
            None => RpcProvider::from_env(kind),
        };
        debug!(url = %rpc.url(), wallet = %kind, "using JSON-RPC endpoint");

        let host = Rc::new(RpcHost::new(rpc));
        let registry = ProviderRegistry::new(host);
        let provider = registry
            .provider(kind)
            .ok_or_else(|| anyhow!("no provider for {kind}"))?;
        let prefs = FilePreferences::load(&config.app, config.storage_key.clone());
        let session = WalletSession::new(registry, prefs, config.clone());
        Ok(Self { provider, session, kind, config })
    }

    fn reader(&self) -> TransactionHistoryReader {
        TransactionHistoryReader::new(self.provider.clone(), &self.config)
    }

    /// Resume the stored session; chain operations require one.
    async fn require_session(&self) -> Result<String> {
        self.session
            .restore_if_approved()
            .await
            .ok_or_else(|| anyhow!("not connected; run `swapverse connect` first"))
    }
}

async fn run(command: &str, opts: &ParsedArgs) -> Result<Value> {
    let cli = Cli::open(opts)?;
    match command {
        "wallets" => Ok(json!(cli.session.available_wallets())),
        "network" => {
            let status = cli.session.guard().current_network(&*cli.provider).await;
            Ok(serde_json::to_value(status)?)
        }
        "history" => {
            let address = opts.arg(0, "address")?;
            let records = cli.reader().history(address, opts.from_block).await;
            Ok(serde_json::to_value(records)?)
        }
        "tx" => {
            let hash = opts.arg(0, "hash")?;
            Ok(serde_json::to_value(cli.reader().transaction(hash).await)?)
        }
        "connect" => {
            let address = cli.session.connect(cli.kind).await?;
            Ok(json!({"address": address, "wallet": cli.kind}))
        }
        "restore" => Ok(json!({"address": cli.session.restore_if_approved().await})),
        "disconnect" => {
            cli.session.disconnect();
            Ok(json!({"disconnected": true}))
        }
        "balance" => {
            let token = opts.arg(0, "token")?;
            cli.require_session().await?;
            let balance = cli.session.token_balance(token).await?;
            Ok(json!({"token": token, "balance": balance}))
        }
        "approve" => {
            let token = opts.arg(0, "token")?;
            let amount = opts.arg(1, "amount")?;
            cli.require_session().await?;
            Ok(serde_json::to_value(cli.session.approve(token, amount).await?)?)
        }
        "swap" => {
            let from = opts.arg(0, "from")?;
            let to = opts.arg(1, "to")?;
            let amount = opts.arg(2, "amount")?;
            cli.require_session().await?;
            Ok(serde_json::to_value(cli.session.swap(from, to, amount).await?)?)
        }
        "accounts" => Ok(json!(cli.provider.accounts().await?)),
        other => bail!("Unknown command: {other}"),
    }
}

fn print_usage() {
    println!(
        r#"swapverse - SwapVerse wallet session and swap history

USAGE:
    swapverse <command> [args] [options]

COMMANDS:
    wallets                     List wallet families the endpoint serves
    accounts                    Accounts exposed by the node
    network                     Current network status
    history <address>           Swap history of an address (newest first)
    tx <hash>                   Transaction details
    connect                     Connect and store the wallet preference
    restore                     Resume the stored session if still valid
    disconnect                  Forget the stored session
    balance <token>             Token balance (TKA7 / TKB7 or address)
    approve <token> <amount>    Approve the swap contract
    swap <from> <to> <amount>   Swap along the configured pair

OPTIONS:
    --rpc, -r <url>             JSON-RPC endpoint (env: SWAPVERSE_RPC_URL, default {DEFAULT_RPC_URL})
    --wallet, -w <kind>         metamask|phantom (env: SWAPVERSE_WALLET)
    --app, -a <name>            App name for preference storage (env: SWAPVERSE_APP)
    --from-block <n>            History start block (default: latest - window)
    --window <n>                History window in blocks (default: 1000)

OUTPUT OPTIONS:
    --json                      Raw JSON output
    --pretty                    Pretty-print JSON
    --version, -V               Print version

ENVIRONMENT:
    SWAPVERSE_ROOT              Preference root (default: platform data dir)
    SWAPVERSE_LOG_JSON=1        JSON logs on stderr
    RUST_LOG                    Log filter (default: info)
"#
    );
}
