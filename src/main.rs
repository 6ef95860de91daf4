use anyhow::{bail, Context, Result};
use banking_app::{
    constraints, decode_unique_violation, fetch_all, fields, init_logging, is_unique_violation, open_database,
    record_balance, setup_database, Client, Creatable, DataError, ErrorType, Filterable, Manager, Settings, Status,
    VERSION,
};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use tracing::info;

const USAGE: &str = "usage: banking-app <init | statuses | balance <client_id> <amount> | clients>";

fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    init_logging(&settings)?;

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&settings),
        Some("statuses") => run_seed_statuses(&settings),
        Some("balance") => {
            let (Some(client_id), Some(amount)) = (args.get(2), args.get(3)) else {
                bail!(USAGE);
            };
            let client_id: i64 = client_id.parse().with_context(|| format!("bad client_id '{}'", client_id))?;
            let amount = Decimal::from_str(amount).with_context(|| format!("bad amount '{}'", amount))?;
            run_balance(&settings, client_id, amount)
        }
        Some("clients") => run_clients(&settings),
        _ => bail!(USAGE),
    }
}

fn run_init(settings: &Settings) -> Result<()> {
    println!("🏦 Banking App v{} - schema setup", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_database(settings)?;
    setup_database(&conn)?;
    println!("✓ Database ready at {}", settings.db_path.display());
    Ok(())
}

fn run_seed_statuses(settings: &Settings) -> Result<()> {
    let conn = open_database(settings)?;
    let statuses = Manager::<Status>::new(settings.clock);

    let rows = vec![fields! { "status" => 200, "description" => "Active" }];
    let stmt = statuses.bulk_create(rows.clone())?;
    match fetch_all(&conn, &stmt) {
        Ok(created) => {
            for status in created {
                println!("✓ Status {} ({})", status.status, status.description);
            }
        }
        Err(DataError::Sqlite(err)) if is_unique_violation(&err) => {
            let pairs = decode_unique_violation::<Status>(&conn, settings.clock, &err, &rows)?;
            let payload = ErrorType::UniqueViolation.payload("Status", &pairs);
            println!("✓ Nothing to do: {}", payload.detail);
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn run_balance(settings: &Settings, client_id: i64, amount: Decimal) -> Result<()> {
    let mut conn = open_database(settings)?;

    // Insert and actualization commit together or not at all
    let tx = conn.transaction()?;
    let (balance, outcome) = record_balance(&tx, settings.clock, client_id, amount)?;
    tx.commit()?;

    info!(client_id, row_id = balance.row_id, "balance recorded");
    println!("✓ Balance {} recorded for client {}", balance.current_amount, client_id);
    if !outcome.cleared.is_empty() {
        println!("  Superseded balances: {:?}", outcome.cleared);
    }
    if outcome.vip_changed {
        let label = if outcome.vip_flag { "granted" } else { "revoked" };
        println!("  VIP status {}", label);
    }
    Ok(())
}

fn run_clients(settings: &Settings) -> Result<()> {
    let conn = open_database(settings)?;
    let stmt = Manager::<Client>::new(settings.clock).filter(&constraints! {})?;
    let clients = fetch_all(&conn, &stmt)?;

    println!("📊 {} clients", clients.len());
    for client in clients {
        let status = client
            .client_status
            .as_ref()
            .map(|s| s.description.as_str())
            .unwrap_or("-");
        let vip = if client.vip_flag { " ⭐ VIP" } else { "" };
        println!(
            "  #{} {} (registered {}, {}){}",
            client.client_id, client.full_name, client.reg_date, status, vip
        );
    }
    Ok(())
}
