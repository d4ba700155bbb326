//! The weir command line interface.
//!
//! `weir run` starts the grid engine for one pair; every option can also
//! be passed through a `WEIR_`-prefixed environment variable. `weir
//! cancel --force` bulk-cancels all open orders of the account,
//! regardless of userref.

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use weir_bins::common::init_logging;
use weir_core::config::{
    BotConfig, DbConfig, NotificationConfig, StrategyKind, TelegramConfig,
};
use weir_core::exchange::kraken::KrakenRest;
use weir_core::exchange::ExchangeRest;
use weir_core::Engine;

#[derive(Parser, Debug)]
#[command(name = "weir", version, about = "Price-reactive grid trading engine")]
struct Cli {
    /// Increase the verbosity of the output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trading engine with the given configuration
    Run(RunArgs),
    /// Cancel all open orders of the account
    Cancel(CancelArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// The exchange API public key
    #[arg(long, env = "WEIR_API_PUBLIC_KEY")]
    api_public_key: String,

    /// The exchange API secret key
    #[arg(long, env = "WEIR_API_SECRET_KEY")]
    api_secret_key: String,

    /// The exchange to trade on
    #[arg(long, env = "WEIR_EXCHANGE", default_value = "Kraken")]
    exchange: String,

    /// The name of this bot instance, used in notifications
    #[arg(long, env = "WEIR_NAME")]
    name: String,

    /// Reference number identifying this instance's orders
    #[arg(long, env = "WEIR_USERREF")]
    userref: i64,

    /// The strategy to run: GridHODL, GridSell, SWING or cDCA
    #[arg(long, env = "WEIR_STRATEGY")]
    strategy: StrategyKind,

    /// The base currency, e.g. BTC
    #[arg(long, env = "WEIR_BASE_CURRENCY")]
    base_currency: String,

    /// The quote currency, e.g. USD
    #[arg(long, env = "WEIR_QUOTE_CURRENCY")]
    quote_currency: String,

    /// The fractional price step between grid levels, e.g. 0.02 for 2 %
    #[arg(long, env = "WEIR_INTERVAL")]
    interval: Decimal,

    /// The quote amount to invest per grid level
    #[arg(long, env = "WEIR_AMOUNT_PER_GRID")]
    amount_per_grid: Decimal,

    /// The maximum quote investment of this instance
    #[arg(long, env = "WEIR_MAX_INVESTMENT")]
    max_investment: Decimal,

    /// The number of concurrently open buy orders
    #[arg(long, env = "WEIR_N_OPEN_BUY_ORDERS", default_value_t = 3)]
    n_open_buy_orders: u32,

    /// Maker fee override; derived from the exchange tier when omitted
    #[arg(long, env = "WEIR_FEE")]
    fee: Option<Decimal>,

    /// Log placements and cancels instead of executing them
    #[arg(long, env = "WEIR_DRY_RUN")]
    dry_run: bool,

    /// SQLite database file; an in-memory database is used when omitted
    #[arg(long, env = "WEIR_SQLITE_FILE")]
    sqlite_file: Option<PathBuf>,

    /// The Telegram bot token for notifications
    #[arg(long, env = "WEIR_TELEGRAM_TOKEN")]
    telegram_token: Option<String>,

    /// The Telegram chat id for notifications
    #[arg(long, env = "WEIR_TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,
}

#[derive(Args, Debug)]
struct CancelArgs {
    /// The exchange API public key
    #[arg(long, env = "WEIR_API_PUBLIC_KEY")]
    api_public_key: String,

    /// The exchange API secret key
    #[arg(long, env = "WEIR_API_SECRET_KEY")]
    api_secret_key: String,

    /// Confirm the bulk cancellation
    #[arg(short, long)]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Run(args) => run(args),
        Command::Cancel(args) => cancel(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = BotConfig {
        api_public_key: args.api_public_key,
        api_secret_key: args.api_secret_key,
        exchange: args.exchange,
        userref: args.userref,
        strategy: args.strategy,
        name: args.name,
        base_currency: args.base_currency,
        quote_currency: args.quote_currency,
        interval: args.interval,
        amount_per_grid: args.amount_per_grid,
        max_investment: args.max_investment,
        n_open_buy_orders: args.n_open_buy_orders,
        fee: args.fee,
        dry_run: args.dry_run,
    };
    let db_config = DbConfig {
        in_memory: args.sqlite_file.is_none(),
        sqlite_file: args.sqlite_file,
    };
    let notification_config = NotificationConfig {
        telegram: match (args.telegram_token, args.telegram_chat_id) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            _ => None,
        },
    };

    let policy = weir_strategies::policy_for(config.strategy);
    let mut engine = Engine::new(config, &db_config, &notification_config, policy)?;
    engine.run()
}

fn cancel(args: CancelArgs) -> Result<()> {
    if !args.force {
        anyhow::bail!("not cancelling anything, --force is required");
    }
    let rest = KrakenRest::new(args.api_public_key, args.api_secret_key);
    rest.cancel_all_orders()?;
    tracing::info!("All open orders have been cancelled.");
    Ok(())
}
