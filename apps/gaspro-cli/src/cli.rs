//! # Command Line Definition
//!
//! ```text
//! gaspro [--db PATH] [--config PATH] <COMMAND>
//!
//!   customer  add | list | show | update | delete | debtors | loans
//!   product   add | list | rename | deactivate | activate
//!   sale      record an invoice
//!   debt      manual
//!   repay     record a repayment
//!   cylinder  out | in | holdings
//!   delete    invoice | repayment | cylinder      (admin password)
//!   redate    invoice | repayment | cylinder
//!   reconcile
//!   export | import | reset                        (import/reset: admin password)
//!   sync      status | push | pull
//!   settings  show | password | types
//! ```
//!
//! Customers may be given by id or by serial number. Products may be given by
//! id or by name.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use gaspro_core::{Money, RepaymentMethod};

#[derive(Debug, Parser)]
#[command(name = "gaspro", version, about = "Gas cylinder distribution ledger")]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "GASPRO_DB_PATH")]
    pub db: Option<PathBuf>,

    /// Sync configuration file (sync.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage customers
    #[command(subcommand)]
    Customer(CustomerCommand),

    /// Manage products
    #[command(subcommand)]
    Product(ProductCommand),

    /// Record a sale
    Sale(SaleArgs),

    /// Record a debt that predates the ledger
    #[command(subcommand)]
    Debt(DebtCommand),

    /// Record a repayment
    Repay(RepayArgs),

    /// Lend, take back and count cylinders
    #[command(subcommand)]
    Cylinder(CylinderCommand),

    /// Delete a transaction (reverses its effect)
    #[command(subcommand)]
    Delete(DeleteCommand),

    /// Change the date of a transaction
    #[command(subcommand)]
    Redate(RedateCommand),

    /// Rebuild cached balances from transaction history
    Reconcile,

    /// Write the whole store as a JSON snapshot
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the whole store with a JSON snapshot
    Import {
        file: PathBuf,
        #[command(flatten)]
        auth: AdminAuth,
    },

    /// Delete all customers, products and transactions
    Reset {
        #[command(flatten)]
        auth: AdminAuth,

        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Replication status and control
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Store settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

// =============================================================================
// Customers & Products
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum CustomerCommand {
    Add(ProfileArgs),
    List {
        /// Filter by name, phone, city or serial
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Customer with full history
    Show { customer: String },
    /// Change profile fields (balances are never touched)
    Update {
        customer: String,
        #[command(flatten)]
        profile: ProfilePatch,
    },
    /// Delete a customer without history
    Delete { customer: String },
    /// Customers with a non-zero balance, largest first
    Debtors,
    /// Customers currently holding cylinders
    Loans,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    pub name: String,
    #[arg(long = "type", default_value = "")]
    pub customer_type: String,
    #[arg(long, default_value = "")]
    pub city: String,
    #[arg(long, default_value = "")]
    pub village: String,
    #[arg(long, default_value = "")]
    pub neighborhood: String,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub whatsapp: Option<String>,
}

/// Only the given fields change.
#[derive(Debug, Args, Default)]
pub struct ProfilePatch {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long = "type")]
    pub customer_type: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub village: Option<String>,
    #[arg(long)]
    pub neighborhood: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub whatsapp: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        size: String,
    },
    List {
        /// Only products that can be sold
        #[arg(long)]
        active: bool,
    },
    Rename {
        product: String,
        name: String,
        #[arg(long)]
        size: Option<String>,
    },
    Deactivate {
        product: String,
    },
    Activate {
        product: String,
    },
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Args)]
pub struct SaleArgs {
    pub customer: String,

    /// Line as PRODUCT:QUANTITY (repeatable)
    #[arg(long = "item", required = true, value_parser = parse_sale_line)]
    pub items: Vec<(String, i64)>,

    #[arg(long, value_parser = parse_money)]
    pub total: Money,

    #[arg(long, value_parser = parse_money, default_value = "0")]
    pub cash: Money,

    #[arg(long, value_parser = parse_money, default_value = "0")]
    pub cheque: Money,

    #[arg(long)]
    pub cheque_number: Option<String>,

    /// YYYY-MM-DD or RFC 3339 (defaults to now)
    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Subcommand)]
pub enum DebtCommand {
    /// Record a pre-existing balance as a synthetic invoice
    Manual {
        customer: String,
        #[arg(value_parser = parse_money)]
        amount: Money,
        #[arg(long, default_value = "")]
        note: String,
    },
}

#[derive(Debug, Args)]
pub struct RepayArgs {
    pub customer: String,

    #[arg(value_parser = parse_money)]
    pub amount: Money,

    #[arg(long, value_enum, default_value_t = MethodArg::Cash)]
    pub method: MethodArg,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Cash,
    Cheque,
}

impl From<MethodArg> for RepaymentMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Cash => RepaymentMethod::Cash,
            MethodArg::Cheque => RepaymentMethod::Cheque,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CylinderCommand {
    /// Lend cylinders to a customer
    Out(CylinderArgs),
    /// Take cylinders back
    In(CylinderArgs),
    /// Holdings of one customer, or totals for the whole store
    Holdings { customer: Option<String> },
}

#[derive(Debug, Args)]
pub struct CylinderArgs {
    pub customer: String,
    pub product: String,
    pub quantity: i64,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Subcommand)]
pub enum DeleteCommand {
    Invoice(DeleteArgs),
    Repayment(DeleteArgs),
    Cylinder(DeleteArgs),
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    pub id: String,
    /// Owner of the transaction
    pub customer: String,
    #[command(flatten)]
    pub auth: AdminAuth,
}

#[derive(Debug, Subcommand)]
pub enum RedateCommand {
    Invoice(RedateArgs),
    Repayment(RedateArgs),
    Cylinder(RedateArgs),
}

#[derive(Debug, Args)]
pub struct RedateArgs {
    pub id: String,
    #[arg(value_parser = parse_date)]
    pub date: DateTime<Utc>,
}

#[derive(Debug, Args, Default)]
pub struct AdminAuth {
    /// Admin password (required once one is set)
    #[arg(long, env = "GASPRO_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

// =============================================================================
// Sync & Settings
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    Status,
    /// Push pending changes now
    Push,
    /// Pull the replica's snapshot (skipped while local changes are pending)
    Pull,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    Show,
    /// Set or change the admin password
    Password {
        new: String,
        #[arg(long)]
        current: Option<String>,
    },
    /// List customer types, or replace them when labels are given
    Types { labels: Vec<String> },
}

// =============================================================================
// Value Parsers
// =============================================================================

fn parse_money(s: &str) -> Result<Money, String> {
    Money::parse(s).ok_or_else(|| format!("'{}' is not an amount (e.g. 150 or 12.50)", s))
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{}' is not a date (YYYY-MM-DD or RFC 3339)", s))
}

fn parse_sale_line(s: &str) -> Result<(String, i64), String> {
    let (product, qty) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("'{}' must look like PRODUCT:QUANTITY", s))?;
    let qty: i64 = qty
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a quantity", qty))?;
    Ok((product.trim().to_string(), qty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sale() {
        let cli = Cli::try_parse_from([
            "gaspro", "sale", "7", "--item", "12kg:2", "--item", "Big Tank:1", "--total", "450",
            "--cash", "100.50",
        ])
        .unwrap();
        let Command::Sale(sale) = cli.command else {
            panic!("expected sale");
        };
        assert_eq!(sale.customer, "7");
        assert_eq!(sale.items, vec![("12kg".to_string(), 2), ("Big Tank".to_string(), 1)]);
        assert_eq!(sale.total, Money::from_minor(45_000));
        assert_eq!(sale.cash, Money::from_minor(10_050));
        assert_eq!(sale.cheque, Money::zero());
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Cli::try_parse_from(["gaspro", "repay", "7", "12.345"]).is_err());
        assert!(Cli::try_parse_from(["gaspro", "sale", "7", "--item", "12kg", "--total", "5"]).is_err());
        assert!(Cli::try_parse_from(["gaspro", "redate", "invoice", "i-1", "yesterday"]).is_err());
    }

    #[test]
    fn test_parse_date_forms() {
        let d = parse_date("2024-03-05").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 3, 5));
        assert!(parse_date("2024-03-05T08:00:00+02:00").is_ok());
    }

    #[test]
    fn test_repay_method() {
        let cli = Cli::try_parse_from(["gaspro", "repay", "c-1", "20", "--method", "cheque"]).unwrap();
        let Command::Repay(args) = cli.command else {
            panic!("expected repay");
        };
        assert_eq!(RepaymentMethod::from(args.method), RepaymentMethod::Cheque);
    }
}
