//! Command-line surface for the USDX client library.
//!
//! Offline helpers (amount codec, slippage floor, contract error lookup)
//! always build.  Commands that talk to a node need the `rpc` feature and
//! read their endpoint, chain and contract addresses from `USDX_*`
//! environment variables.

use std::collections::HashMap;
use std::env;

use tracing_subscriber::EnvFilter;
use usdx_client::amount::{self, DEFAULT_DECIMALS, MAX_DECIMALS};
use usdx_client::errors::{classify, SettlementError};
use usdx_client::slippage::{min_acceptable, SlippageTolerance};
use usdx_client::{ScaledAmount, U256};

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: usdx <command> ...");
    println!("  amount parse <text> [--decimals N]");
    println!("  amount format <raw> [--decimals N] [--max N]");
    println!("  min-out <amount> [--slippage-bps N]");
    println!("  error <name>");
    print_chain_help();
}

#[cfg(feature = "rpc")]
fn print_chain_help() {
    println!("  quote <mint|redeem> <amount> [--slippage-bps N] [--json]");
    println!("  stats [--json]");
    println!("  warnings [--json]");
    println!("  balances [account] [--json]");
    println!("  queue [account] [--json]");
    println!("  position [account] [--json]");
    println!("  mint <usdx> [--slippage-bps N] [--referrer 0x..]");
    println!("  redeem <usdx> [--slippage-bps N] [--referrer 0x..]");
    println!("  approve <usdx> [--spender curve|staking]");
    println!("  stake <usdx>");
    println!("  unstake <usdx>");
    println!("  complete <index>");
    println!("  claim");
    println!("  update-price");
}

#[cfg(not(feature = "rpc"))]
fn print_chain_help() {}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Positional arguments plus `--flag value` options and bare `--json`.
struct Args {
    positional: Vec<String>,
    options: HashMap<String, String>,
    json: bool,
}

impl Args {
    fn parse(raw: Vec<String>) -> Self {
        let mut positional = Vec::new();
        let mut options = HashMap::new();
        let mut json = false;
        let mut iter = raw.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "--json" {
                json = true;
            } else if let Some(flag) = arg.strip_prefix("--") {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fatal(&format!("--{flag} expects a value")));
                options.insert(flag.to_string(), value);
            } else {
                positional.push(arg);
            }
        }
        Self {
            positional,
            options,
            json,
        }
    }

    fn positional(&self, index: usize, usage: &str) -> &str {
        self.positional
            .get(index)
            .map(String::as_str)
            .unwrap_or_else(|| fatal(usage))
    }

    fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    fn number(&self, name: &str) -> Option<u64> {
        self.option(name).map(|v| {
            v.parse()
                .unwrap_or_else(|_| fatal(&format!("invalid --{name}: {v}")))
        })
    }

    fn decimals(&self) -> u32 {
        let decimals = self.number("decimals").unwrap_or(u64::from(DEFAULT_DECIMALS));
        if decimals > u64::from(MAX_DECIMALS) {
            fatal(&format!("--decimals must be at most {MAX_DECIMALS}"));
        }
        decimals as u32
    }

    fn tolerance(&self) -> SlippageTolerance {
        match self.number("slippage-bps") {
            Some(bps) => SlippageTolerance::new(bps).unwrap_or_else(|e| fatal(&e.to_string())),
            None => SlippageTolerance::default(),
        }
    }
}

fn main() {
    init_logging();
    let mut args = env::args().skip(1);
    let command = args.next();
    match command.as_deref() {
        Some("amount") => {
            let sub = args.next().unwrap_or_else(|| {
                eprintln!("Usage: usdx amount <parse|format> ...");
                std::process::exit(1);
            });
            handle_amount(&sub, Args::parse(args.collect()));
        }
        Some("min-out") => cmd_min_out(Args::parse(args.collect())),
        Some("error") => cmd_error(Args::parse(args.collect())),
        Some("-h") | Some("--help") | Some("help") => print_help(),
        #[cfg(feature = "rpc")]
        Some(other) if chain::COMMANDS.contains(&other) => {
            chain::run(other, Args::parse(args.collect()));
        }
        _ => {
            print_help();
            std::process::exit(1);
        }
    }
}

fn handle_amount(sub: &str, args: Args) {
    match sub {
        "parse" => cmd_amount_parse(args),
        "format" => cmd_amount_format(args),
        _ => fatal(&format!("Unknown amount subcommand: {sub}")),
    }
}

fn cmd_amount_parse(args: Args) {
    let text = args.positional(0, "Usage: usdx amount parse <text> [--decimals N]");
    let parsed = amount::parse(text, args.decimals());
    println!("{}", parsed.raw());
}

fn cmd_amount_format(args: Args) {
    let raw = args.positional(0, "Usage: usdx amount format <raw> [--decimals N] [--max N]");
    let raw = U256::from_dec_str(raw).unwrap_or_else(|_| fatal(&format!("invalid raw amount: {raw}")));
    let decimals = args.decimals();
    let max = args
        .number("max")
        .map(|m| m.min(u64::from(decimals)) as u32)
        .unwrap_or(4);
    println!("{}", amount::format(ScaledAmount::from_raw(raw), decimals, max));
}

fn cmd_min_out(args: Args) {
    let text = args.positional(0, "Usage: usdx min-out <amount> [--slippage-bps N]");
    let wanted = amount::parse(text, DEFAULT_DECIMALS);
    let tolerance = args.tolerance();
    let floor = min_acceptable(wanted, tolerance);
    println!(
        "{} (raw {}, {} bps)",
        amount::format(floor, DEFAULT_DECIMALS, DEFAULT_DECIMALS),
        floor.raw(),
        tolerance.bps()
    );
}

fn cmd_error(args: Args) {
    let name = args.positional(0, "Usage: usdx error <name>");
    let classified = classify(&SettlementError::Contract {
        name: name.to_string(),
    });
    println!("{}", classified.message);
}

#[cfg(feature = "rpc")]
mod chain {
    use super::{fatal, Args};
    use serde::Serialize;
    use std::sync::Arc;
    use usdx_client::account::Balances;
    use usdx_client::actions::{self, StakeContext, StakeGate, StakeMode, SwapDetails, TradeContext, TradeGate};
    use usdx_client::amount::{self, DEFAULT_DECIMALS};
    use usdx_client::format::{
        format_cr, format_eth, format_percent, format_time_remaining, format_usd, format_usdx,
    };
    use usdx_client::net::JsonRpcSettlement;
    use usdx_client::settlement::{Address, ContractId, SubmitRequest, SystemClock};
    use usdx_client::{
        ClientConfig, ClientSession, ExecuteOutcome, LogNotifier, QuoteView, ScaledAmount, TradeDirection,
    };

    pub const COMMANDS: &[&str] = &[
        "quote",
        "stats",
        "warnings",
        "balances",
        "queue",
        "position",
        "mint",
        "redeem",
        "approve",
        "stake",
        "unstake",
        "complete",
        "claim",
        "update-price",
    ];

    pub fn run(command: &str, args: Args) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|err| fatal(&format!("failed to start runtime: {err}")));
        runtime.block_on(dispatch(command, args));
    }

    async fn dispatch(command: &str, args: Args) {
        match command {
            "quote" => cmd_quote(args).await,
            "stats" => cmd_stats(args).await,
            "warnings" => cmd_warnings(args).await,
            "balances" => cmd_balances(args).await,
            "queue" => cmd_queue(args).await,
            "position" => cmd_position(args).await,
            "mint" => cmd_trade(TradeDirection::Mint, args).await,
            "redeem" => cmd_trade(TradeDirection::Redeem, args).await,
            "approve" => cmd_approve(args).await,
            "stake" => cmd_stake(StakeMode::Stake, args).await,
            "unstake" => cmd_stake(StakeMode::Unstake, args).await,
            "complete" => {
                let index = args.positional(0, "Usage: usdx complete <index>");
                let index: usize = index
                    .parse()
                    .unwrap_or_else(|_| fatal(&format!("invalid index: {index}")));
                submit(
                    &open_session(None),
                    actions::COMPLETE_UNSTAKE,
                    actions::complete_unstake_request(index),
                )
                .await;
            }
            "claim" => {
                submit(&open_session(None), actions::CLAIM_REWARDS, actions::claim_rewards_request()).await;
            }
            "update-price" => {
                submit(&open_session(None), actions::UPDATE_PRICE, actions::update_price_request()).await;
            }
            _ => fatal(&format!("Unknown command: {command}")),
        }
    }

    fn open_session(account: Option<&str>) -> ClientSession {
        let mut config = ClientConfig::from_env().unwrap_or_else(|err| fatal(&err.to_string()));
        if let Some(account) = account {
            let parsed: Address = account
                .parse()
                .unwrap_or_else(|err| fatal(&format!("invalid account: {err}")));
            config.account = Some(parsed);
        }
        let settlement = JsonRpcSettlement::from_config(&config).unwrap_or_else(|err| fatal(&err.to_string()));
        ClientSession::new(
            config,
            Arc::new(settlement),
            Arc::new(SystemClock),
            Arc::new(LogNotifier),
        )
    }

    fn amount_arg(args: &Args, usage: &str) -> ScaledAmount {
        let text = args.positional(0, usage);
        let value = amount::parse(text, DEFAULT_DECIMALS);
        if value.is_zero() {
            fatal(&format!("invalid or zero amount: {text}"));
        }
        value
    }

    fn print_json<T: Serialize>(value: &T) {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|err| fatal(&format!("encode failed: {err}")));
        println!("{text}");
    }

    fn account_session(args: &Args) -> ClientSession {
        open_session(args.positional.first().map(String::as_str))
    }

    async fn fetch_quote(session: &ClientSession, direction: TradeDirection, value: ScaledAmount) -> QuoteView {
        let engine = session.quote_engine(direction);
        engine.set_amount(value);
        engine.refresh().await
    }

    #[derive(Serialize)]
    struct QuoteReport {
        #[serde(flatten)]
        view: QuoteView,
        details: Option<SwapDetails>,
    }

    async fn cmd_quote(args: Args) {
        let usage = "Usage: usdx quote <mint|redeem> <amount> [--slippage-bps N] [--json]";
        let direction = match args.positional(0, usage) {
            "mint" => TradeDirection::Mint,
            "redeem" => TradeDirection::Redeem,
            other => fatal(&format!("unknown direction: {other}")),
        };
        let value = amount::parse(args.positional(1, usage), DEFAULT_DECIMALS);
        let session = open_session(None);
        let view = fetch_quote(&session, direction, value).await;
        let eth_price = session.stats().await.eth_price;
        let details = actions::swap_details(direction, value, view.quote.as_ref(), eth_price, args.tolerance());
        if args.json {
            return print_json(&QuoteReport { view, details });
        }
        if let Some(error) = &view.error {
            fatal(error);
        }
        match (&view.quote, direction) {
            (Some(quote), TradeDirection::Mint) => {
                println!("{} costs {}", format_usdx(value), format_eth(quote.counter_amount));
            }
            (Some(quote), TradeDirection::Redeem) => {
                println!(
                    "{} returns {} (fee {})",
                    format_usdx(value),
                    format_eth(quote.counter_amount),
                    format_eth(quote.fee)
                );
            }
            (None, _) => println!("no quote for a zero amount"),
        }
        if let Some(details) = details {
            if let Some(rate) = &details.rate {
                println!("rate           {rate}");
            }
            if let Some(fee) = &details.fee {
                println!("fee            {fee}");
            }
            println!("min. received  {}", details.min_received);
            println!("slippage       {}", details.slippage);
        }
    }

    async fn cmd_stats(args: Args) {
        let stats = open_session(None).stats().await;
        if args.json {
            return print_json(&stats);
        }
        let cr = format_cr(stats.cr_percent);
        println!("collateral ratio  {} ({:?})", cr.text, cr.tier);
        println!("eth reserves      {}", format_eth(stats.eth_reserves));
        println!("usdx supply       {}", format_usdx(stats.total_supply));
        println!("usdx staked       {}", format_usdx(stats.total_staked));
        println!("eth price         {}", format_usd(stats.eth_price));
        println!(
            "volume cap used   {} of {}",
            format_percent(stats.volume_used_bps()),
            format_usdx(stats.volume_cap)
        );
        println!("paused            {}", stats.paused);
        if stats.failed_reads > 0 {
            eprintln!("{} reads failed; their fields show zero", stats.failed_reads);
        }
    }

    async fn cmd_warnings(args: Args) {
        let warnings = open_session(None).warnings().await;
        if args.json {
            return print_json(&warnings);
        }
        if warnings.is_empty() {
            println!("no active warnings");
        }
        for warning in warnings {
            println!("[{:?}] {}: {}", warning.level, warning.key, warning.message);
        }
    }

    async fn cmd_balances(args: Args) {
        let balances: Balances = account_session(&args)
            .balances()
            .await
            .unwrap_or_else(|err| fatal(&err.to_string()));
        if args.json {
            return print_json(&balances);
        }
        println!("eth   {}", format_eth(balances.eth));
        println!("usdx  {}", format_usdx(balances.usdx));
    }

    async fn cmd_queue(args: Args) {
        let queue = account_session(&args)
            .unstake_queue()
            .await
            .unwrap_or_else(|err| fatal(&err.to_string()));
        if args.json {
            return print_json(&queue);
        }
        if queue.entries.is_empty() {
            println!("no pending unstake requests");
        }
        for entry in &queue.entries {
            let remaining = i64::try_from(entry.seconds_remaining).unwrap_or(i64::MAX);
            println!(
                "#{}  {}  {}",
                entry.index,
                format_usdx(entry.amount),
                format_time_remaining(remaining)
            );
        }
    }

    async fn cmd_position(args: Args) {
        let position = account_session(&args)
            .position()
            .await
            .unwrap_or_else(|err| fatal(&err.to_string()));
        if args.json {
            return print_json(&position);
        }
        println!("staked   {}", format_usdx(position.staked));
        println!("rewards  {}", format_eth(position.pending_rewards));
    }

    async fn cmd_trade(direction: TradeDirection, args: Args) {
        let value = amount_arg(&args, "Usage: usdx <mint|redeem> <usdx> [--slippage-bps N] [--referrer 0x..]");
        let tolerance = args.tolerance();
        let referrer = actions::referrer_or_default(args.option("referrer"));
        let session = open_session(None);

        let view = fetch_quote(&session, direction, value).await;
        let quote = match (view.quote, view.error) {
            (Some(quote), _) => quote,
            (None, Some(error)) => fatal(&error),
            (None, None) => fatal("no quote available"),
        };
        let stats = session.stats().await;
        let balances = session.balances().await.unwrap_or_else(|err| fatal(&err.to_string()));
        let allowance = session
            .allowance(ContractId::BondingCurve)
            .await
            .unwrap_or_else(|err| fatal(&err.to_string()));
        let gate = actions::gate_trade(&TradeContext {
            status: session.lifecycle(actions::trade_label(direction)).status(),
            paused: stats.paused,
            direction,
            amount: value,
            eth_cost: Some(quote.counter_amount),
            eth_balance: balances.eth,
            usdx_balance: balances.usdx,
            allowance: allowance.0,
        });
        match gate {
            TradeGate::Ready(_) => {}
            TradeGate::Approve => fatal("USDX allowance too low; run `usdx approve <usdx>` first"),
            other => fatal(other.label()),
        }
        let request = actions::trade_request(direction, value, &quote, tolerance, referrer);
        submit(&session, actions::trade_label(direction), request).await;
    }

    async fn cmd_stake(mode: StakeMode, args: Args) {
        let usage = match mode {
            StakeMode::Stake => "Usage: usdx stake <usdx>",
            StakeMode::Unstake => "Usage: usdx unstake <usdx>",
        };
        let value = amount_arg(&args, usage);
        let session = open_session(None);
        let mut ctx = StakeContext {
            status: session.lifecycle(mode.label()).status(),
            mode,
            amount: value,
            usdx_balance: ScaledAmount::zero(),
            staked: ScaledAmount::zero(),
            allowance: ScaledAmount::zero(),
        };
        match mode {
            StakeMode::Stake => {
                let balances = session.balances().await.unwrap_or_else(|err| fatal(&err.to_string()));
                let allowance = session
                    .allowance(ContractId::StakingRewards)
                    .await
                    .unwrap_or_else(|err| fatal(&err.to_string()));
                ctx.usdx_balance = balances.usdx;
                ctx.allowance = allowance.0;
            }
            StakeMode::Unstake => {
                let position = session.position().await.unwrap_or_else(|err| fatal(&err.to_string()));
                ctx.staked = position.staked;
            }
        }
        match actions::gate_stake(&ctx) {
            StakeGate::Ready(_) => {}
            StakeGate::Approve => {
                fatal("USDX allowance too low; run `usdx approve <usdx> --spender staking` first")
            }
            other => fatal(other.label()),
        }
        let request = match mode {
            StakeMode::Stake => actions::stake_request(value),
            StakeMode::Unstake => actions::initiate_unstake_request(value),
        };
        submit(&session, mode.label(), request).await;
    }

    async fn cmd_approve(args: Args) {
        let value = amount_arg(&args, "Usage: usdx approve <usdx> [--spender curve|staking]");
        let spender = match args.option("spender").unwrap_or("curve") {
            "curve" => ContractId::BondingCurve,
            "staking" => ContractId::StakingRewards,
            other => fatal(&format!("unknown spender: {other}")),
        };
        let session = open_session(None);
        let spender = session.config().contracts.address_of(spender);
        submit(&session, actions::APPROVE_USDX, actions::approve_request(spender, value)).await;
    }

    async fn submit(session: &ClientSession, label: &str, request: SubmitRequest) {
        if session.config().account.is_none() {
            fatal("no account configured; set USDX_ACCOUNT");
        }
        match session.lifecycle(label).execute(request).await {
            ExecuteOutcome::Confirmed(handle) => println!("{label} confirmed: {handle}"),
            ExecuteOutcome::Failed(error) => fatal(&error.message),
            ExecuteOutcome::Ignored => fatal("another submission is in flight"),
            ExecuteOutcome::Detached => println!("{label} detached before confirmation"),
        }
    }
}
