use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use colored::Colorize;
use serde::Deserialize;
use serde::Serialize;

use crate::broker::BrokerRegistry;
use crate::error::ValidationError;
use crate::holdings::{compute_broker_distribution, compute_holdings, compute_summary};
use crate::quotes::QuoteClient;
use crate::store::PortfolioStore;
use crate::transaction::{parse_purchase_date, Currency, Transaction, TransactionType};

mod backup;
mod broker;
mod error;
mod holdings;
mod quotes;
mod store;
mod transaction;
mod tui;

#[derive(Serialize, Deserialize)]
struct Config {
    database_path: String,
    currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "stockfolio.db".to_string(),
            currency: "USD".to_string(),
        }
    }
}

fn cli() -> Command {
    let trade_args = |cmd: Command| {
        cmd.arg(arg!(<TICKER> "Ticker symbol"))
            .arg(arg!(<QUANTITY> "Number of shares"))
            .arg(arg!(<PRICE> "Price per share"))
            .arg(arg!(--broker <BROKER> "Broker name").required(true))
            .arg(arg!(--date <DATE> "Trade date (YYYY-MM-DD), defaults to today").required(false))
            .arg(arg!(--currency <CURRENCY> "USD or KRW").default_value("USD"))
    };

    Command::new("stockfolio")
        .about("A simple stock portfolio tracker")
        .arg_required_else_help(true)
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(Command::new("holdings").about("Show current holdings with live prices"))
        .subcommand(Command::new("summary").about("Show portfolio totals and gain/loss"))
        .subcommand(
            Command::new("distribution").about("Show portfolio value distribution by broker"),
        )
        .subcommand(trade_args(Command::new("buy").about("Record a buy transaction")))
        .subcommand(trade_args(Command::new("sell").about("Record a sell transaction")))
        .subcommand(
            Command::new("transactions")
                .about("List recorded transactions")
                .arg(arg!(--ticker <TICKER> "Only show one ticker").required(false)),
        )
        .subcommand(
            Command::new("remove-transaction")
                .about("Delete a transaction by id")
                .arg(arg!(<ID> "Transaction id")),
        )
        .subcommand(
            Command::new("brokers")
                .about("Manage the broker list")
                .arg_required_else_help(true)
                .subcommand(Command::new("list").about("List all brokers"))
                .subcommand(
                    Command::new("add")
                        .about("Register a new broker")
                        .arg(arg!(<NAME> "Broker name")),
                )
                .subcommand(
                    Command::new("enable")
                        .about("Mark a broker active")
                        .arg(arg!(<ID> "Broker id")),
                )
                .subcommand(
                    Command::new("disable")
                        .about("Mark a broker inactive")
                        .arg(arg!(<ID> "Broker id")),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Delete a broker")
                        .arg(arg!(<ID> "Broker id")),
                ),
        )
        .subcommand(
            Command::new("backup")
                .about("Export all data to a JSON backup file")
                .arg(arg!([FILE] "Output file (defaults to stock-portfolio-backup-<date>.json)")),
        )
        .subcommand(
            Command::new("restore")
                .about("Replace all data with a JSON backup file")
                .arg(arg!(<FILE> "Backup file to restore")),
        )
        .subcommand(Command::new("tui").about("Open the interactive dashboard"))
}

/// Fetches live prices for every held ticker. Failed symbols are reported
/// and fall back to average cost in the engine.
async fn live_prices(
    store: &PortfolioStore,
    client: &QuoteClient,
) -> eyre::Result<HashMap<String, f64>> {
    let transactions = store.transactions()?;
    let mut tickers: Vec<String> = transactions.iter().map(|t| t.ticker.clone()).collect();
    tickers.sort();
    tickers.dedup();

    let (prices, errors) = client.price_map(&tickers).await;
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("{}", format!("Warning: {error}").yellow());
        }
        eprintln!(
            "{}",
            format!(
                "{} symbol(s) without a live quote, valued at average cost",
                errors.len()
            )
            .yellow()
        );
    }
    Ok(prices)
}

fn record_transaction(
    store: &PortfolioStore,
    matches: &ArgMatches,
    transaction_type: TransactionType,
) -> eyre::Result<()> {
    let ticker = matches.get_one::<String>("TICKER").expect("required");
    let quantity_raw = matches.get_one::<String>("QUANTITY").expect("required");
    let price_raw = matches.get_one::<String>("PRICE").expect("required");
    let broker_name = matches.get_one::<String>("broker").expect("required");

    let quantity: f64 = quantity_raw
        .parse()
        .map_err(|_| ValidationError::InvalidQuantity(quantity_raw.clone()))?;
    let price: f64 = price_raw
        .parse()
        .map_err(|_| ValidationError::InvalidPrice(price_raw.clone()))?;
    let date = match matches.get_one::<String>("date") {
        Some(raw) => parse_purchase_date(raw)?,
        None => chrono::Utc::now(),
    };
    let currency = Currency::from_str(matches.get_one::<String>("currency").expect("default"))?;

    let broker = BrokerRegistry::new(store).resolve_active(broker_name)?;
    let transaction = Transaction::new(
        ticker,
        &broker.name,
        quantity,
        price,
        date,
        transaction_type,
        currency,
    )?;
    let id = transaction.id.clone();
    store.append_transaction(transaction)?;

    println!(
        "{}",
        format!(
            "Recorded {transaction_type} {quantity} {} @ {price} via {} ({id})",
            ticker.to_uppercase(),
            broker.name
        )
        .green()
    );
    Ok(())
}

fn print_holdings(store: &PortfolioStore, prices: &HashMap<String, f64>) -> eyre::Result<()> {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    let transactions = store.transactions()?;
    let holdings = compute_holdings(&transactions, prices);
    let summary = compute_summary(&holdings);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new("Ticker").add_attribute(Attribute::Bold),
        Cell::new("Qty").add_attribute(Attribute::Bold),
        Cell::new("Avg Cost").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
        Cell::new("PnL").add_attribute(Attribute::Bold),
        Cell::new("PnL %").add_attribute(Attribute::Bold),
        Cell::new("Weight").add_attribute(Attribute::Bold),
    ]);

    for holding in &holdings {
        let pnl_color = if holding.gain_loss >= 0.0 {
            TColor::Green
        } else {
            TColor::Red
        };
        table.add_row(vec![
            Cell::new(&holding.ticker),
            Cell::new(format!("{:.4}", holding.quantity)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", holding.average_price)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", holding.current_value)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", holding.gain_loss))
                .set_alignment(CellAlignment::Right)
                .fg(pnl_color),
            Cell::new(format!("{:.2}%", holding.gain_loss_percent))
                .set_alignment(CellAlignment::Right)
                .fg(pnl_color),
            Cell::new(format!("{:.2}%", holding.weight)).set_alignment(CellAlignment::Right),
        ]);
    }

    let total_color = if summary.total_gain_loss >= 0.0 {
        TColor::Green
    } else {
        TColor::Red
    };
    table.add_row(vec![
        Cell::new("TOTAL").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(format!("{:.2}", summary.total_investment))
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
        Cell::new(format!("{:.2}", summary.total_value))
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
        Cell::new(format!("{:.2}", summary.total_gain_loss))
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold)
            .fg(total_color),
        Cell::new(format!("{:.2}%", summary.gain_loss_percent))
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold)
            .fg(total_color),
        Cell::new(""),
    ]);

    println!("{table}");
    Ok(())
}

async fn print_summary(
    store: &PortfolioStore,
    client: &QuoteClient,
    display_currency: &str,
) -> eyre::Result<()> {
    let prices = live_prices(store, client).await?;
    let transactions = store.transactions()?;
    let holdings = compute_holdings(&transactions, &prices);
    let summary = compute_summary(&holdings);

    let pnl = format!(
        "{:+.2} ({:+.2}%)",
        summary.total_gain_loss, summary.gain_loss_percent
    );
    let pnl = if summary.total_gain_loss >= 0.0 {
        pnl.green()
    } else {
        pnl.red()
    };

    println!("Total value:      {:.2} USD", summary.total_value);
    println!("Total investment: {:.2} USD", summary.total_investment);
    println!("Gain/loss:        {pnl}");

    // optional converted total when the configured display currency differs
    if let Ok(target) = Currency::from_str(display_currency) {
        if target != Currency::Usd {
            match client.exchange_rate(Currency::Usd, target).await {
                Ok(rate) => println!(
                    "Total value:      {:.2} {target} (1 USD = {rate:.2} {target})",
                    summary.total_value * rate
                ),
                Err(e) => eprintln!("{}", format!("Warning: {e}").yellow()),
            }
        }
    }
    Ok(())
}

fn print_distribution(store: &PortfolioStore, prices: &HashMap<String, f64>) -> eyre::Result<()> {
    use piechart::{Chart, Color};

    let transactions = store.transactions()?;
    let slices = compute_broker_distribution(&transactions, prices);
    if slices.is_empty() {
        println!("No holdings to distribute.");
        return Ok(());
    }

    let colors = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Cyan,
        Color::White,
        Color::Purple,
        Color::Black,
    ];

    let data: Vec<piechart::Data> = slices
        .iter()
        .enumerate()
        .map(|(i, slice)| piechart::Data {
            label: slice.broker.clone(),
            value: slice.value as f32,
            color: Some(colors[i % colors.len()].into()),
            fill: '•',
        })
        .collect();

    Chart::new().legend(true).radius(9).aspect_ratio(3).draw(&data);

    println!("====================================");
    for slice in &slices {
        println!(
            "{: >16} | {: >12.2} | {: >6.2}%",
            slice.broker, slice.value, slice.weight
        );
    }
    Ok(())
}

fn print_transactions(store: &PortfolioStore, ticker: Option<&String>) -> eyre::Result<()> {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table,
    };

    let mut transactions = store.transactions()?;
    if let Some(ticker) = ticker {
        let ticker = ticker.to_uppercase();
        transactions.retain(|t| t.ticker == ticker);
    }
    // display is date-sorted; storage keeps insertion order
    transactions.sort_by_key(|t| t.purchase_date);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
    table.set_header(vec![
        Cell::new("Date").add_attribute(Attribute::Bold),
        Cell::new("Type").add_attribute(Attribute::Bold),
        Cell::new("Ticker").add_attribute(Attribute::Bold),
        Cell::new("Qty").add_attribute(Attribute::Bold),
        Cell::new("Price").add_attribute(Attribute::Bold),
        Cell::new("Broker").add_attribute(Attribute::Bold),
        Cell::new("Id").add_attribute(Attribute::Bold),
    ]);

    for t in &transactions {
        table.add_row(vec![
            Cell::new(t.purchase_date.format("%Y-%m-%d").to_string()),
            Cell::new(t.transaction_type.to_string()),
            Cell::new(&t.ticker),
            Cell::new(format!("{:.4}", t.quantity)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2} {}", t.purchase_price, t.currency))
                .set_alignment(CellAlignment::Right),
            Cell::new(&t.broker),
            Cell::new(&t.id),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn print_brokers(store: &PortfolioStore) -> eyre::Result<()> {
    use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};

    let brokers = BrokerRegistry::new(store).list()?;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Since").add_attribute(Attribute::Bold),
        Cell::new("Id").add_attribute(Attribute::Bold),
    ]);
    for broker in &brokers {
        let status = if broker.is_active {
            Cell::new("active").fg(comfy_table::Color::Green)
        } else {
            Cell::new("inactive").fg(comfy_table::Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&broker.name),
            status,
            Cell::new(broker.created_at.format("%Y-%m-%d").to_string()),
            Cell::new(&broker.id),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn handle_brokers(store: &PortfolioStore, matches: &ArgMatches) -> eyre::Result<()> {
    let registry = BrokerRegistry::new(store);
    match matches.subcommand() {
        Some(("list", _)) => print_brokers(store)?,
        Some(("add", m)) => {
            let broker = registry.add(m.get_one::<String>("NAME").expect("required"))?;
            println!("{}", format!("Added broker {} ({})", broker.name, broker.id).green());
        }
        Some(("enable", m)) => {
            registry.set_active(m.get_one::<String>("ID").expect("required"), true)?;
            println!("{}", "Broker enabled".green());
        }
        Some(("disable", m)) => {
            registry.set_active(m.get_one::<String>("ID").expect("required"), false)?;
            println!("{}", "Broker disabled".green());
        }
        Some(("remove", m)) => {
            registry.remove(m.get_one::<String>("ID").expect("required"))?;
            println!("{}", "Broker removed".green());
        }
        _ => (),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg: Config = confy::load("stockfolio", "config")?;
    let matches = cli().get_matches();

    if matches.subcommand_matches("config").is_some() {
        println!(
            "Your config file is located here: \n{}",
            confy::get_configuration_file_path("stockfolio", "config")?.display()
        );
        return Ok(());
    }

    let store = Arc::new(PortfolioStore::open(&cfg.database_path)?);
    let client = Arc::new(QuoteClient::new());

    match matches.subcommand() {
        Some(("holdings", _)) => {
            let prices = live_prices(&store, &client).await?;
            print_holdings(&store, &prices)?;
        }
        Some(("summary", _)) => print_summary(&store, &client, &cfg.currency).await?,
        Some(("distribution", _)) => {
            let prices = live_prices(&store, &client).await?;
            print_distribution(&store, &prices)?;
        }
        Some(("buy", m)) => record_transaction(&store, m, TransactionType::Buy)?,
        Some(("sell", m)) => record_transaction(&store, m, TransactionType::Sell)?,
        Some(("transactions", m)) => print_transactions(&store, m.get_one::<String>("ticker"))?,
        Some(("remove-transaction", m)) => {
            store.remove_transaction(m.get_one::<String>("ID").expect("required"))?;
            println!("{}", "Transaction removed".green());
        }
        Some(("brokers", m)) => handle_brokers(&store, m)?,
        Some(("backup", m)) => {
            let filename = m
                .get_one::<String>("FILE")
                .cloned()
                .unwrap_or_else(backup::default_backup_filename);
            let (tx_count, broker_count) = backup::export(&store, Path::new(&filename))?;
            println!(
                "{}",
                format!("Exported {tx_count} transaction(s) and {broker_count} broker(s) to {filename}")
                    .green()
            );
        }
        Some(("restore", m)) => {
            let filename = m.get_one::<String>("FILE").expect("required");
            let (tx_count, broker_count) = backup::restore(&store, Path::new(filename))?;
            println!(
                "{}",
                format!("Restored {tx_count} transaction(s) and {broker_count} broker(s)").green()
            );
        }
        Some(("tui", _)) => tui::run_tui(store.clone(), client.clone(), cfg.currency.clone()).await?,
        _ => cli().print_help()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        let matches = cli().get_matches_from(vec!["stockfolio", "holdings"]);
        assert_eq!(matches.subcommand_name(), Some("holdings"));
    }

    #[test]
    fn test_cli_buy_args() {
        let matches = cli().get_matches_from(vec![
            "stockfolio",
            "buy",
            "AAPL",
            "10",
            "178.50",
            "--broker",
            "Schwab",
            "--date",
            "2024-05-17",
        ]);
        let (name, m) = matches.subcommand().unwrap();
        assert_eq!(name, "buy");
        assert_eq!(m.get_one::<String>("TICKER").unwrap(), "AAPL");
        assert_eq!(m.get_one::<String>("broker").unwrap(), "Schwab");
        assert_eq!(m.get_one::<String>("currency").unwrap(), "USD");
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.currency, "USD");
        assert!(!cfg.database_path.is_empty());
    }
}
