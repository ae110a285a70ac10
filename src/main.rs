// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;

use vehicle_valuation::{
    format_adjustment, get_all_vehicles, get_vehicles_by_owner, init_tracing, insert_vehicles,
    load_csv, open_database, verify_count, AppConfig, ConditionGrade, PriceCalculator, Vehicle,
    VehicleAnalytics, VehicleListing, VehicleManager, DEFAULT_MILEAGE,
};

#[derive(Parser)]
#[command(name = "vehicle-valuation", version, about = "List, value and compare vehicle records")]
struct Cli {
    /// SQLite database file (overrides VEHICLE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Import vehicles from a CSV file (make,model,year,price[,description][,owner])
    Import {
        csv: PathBuf,
        /// Name recorded in the activity log
        #[arg(long, default_value = "importer")]
        actor: String,
    },
    /// List stored vehicles, optionally filtered
    List {
        #[arg(long)]
        make: Option<String>,
        #[arg(long)]
        min_year: Option<i32>,
        #[arg(long)]
        max_year: Option<i32>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
    },
    /// Estimate the market value of one vehicle
    Value {
        make: String,
        model: String,
        year: i32,
        price: f64,
        /// excellent, good, fair or poor
        #[arg(long, default_value = "good")]
        condition: String,
        #[arg(long, default_value_t = DEFAULT_MILEAGE)]
        mileage: u32,
    },
    /// Rank every stored vehicle by retained value
    Compare,
    /// Suggest a listing price from make and model year
    Suggest {
        make: String,
        year: i32,
        #[arg(long, default_value = "good")]
        condition: String,
    },
    /// Print the analytics summary as JSON
    Analytics {
        /// Only vehicles listed by this owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// Browse the inventory in a terminal UI (default)
    Ui,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    init_tracing(config.log_level);

    let calculator = PriceCalculator::new();

    match cli.command.unwrap_or(Command::Ui) {
        Command::Import { csv, actor } => run_import(&config.database_path, &csv, &actor),
        Command::List {
            make,
            min_year,
            max_year,
            min_price,
            max_price,
        } => {
            let conn = open_database(&config.database_path)?;
            let mut manager = VehicleManager::from_vehicles(get_all_vehicles(&conn)?);

            if let Some(make) = make {
                manager = narrow(manager.filter_by_make(&make));
            }
            if min_year.is_some() || max_year.is_some() {
                manager = narrow(manager.filter_by_year_range(
                    min_year.unwrap_or(i32::MIN),
                    max_year.unwrap_or(i32::MAX),
                ));
            }
            if min_price.is_some() || max_price.is_some() {
                manager = narrow(manager.filter_by_price_range(
                    min_price.unwrap_or(f64::MIN),
                    max_price.unwrap_or(f64::MAX),
                ));
            }

            print_vehicles(&manager);
            Ok(())
        }
        Command::Value {
            make,
            model,
            year,
            price,
            condition,
            mileage,
        } => {
            let grade = ConditionGrade::from_label(&condition);
            let result =
                calculator.calculate_market_value(&make, &model, year, price, grade, mileage)?;

            println!("🚗 {}", result.vehicle_label);
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("  Base price:          {:>12.2}", result.base_price);
            println!("  Depreciated value:   {:>12.2}", result.depreciated_value);
            println!("  Make adjustment:     {:>12}", format_adjustment(result.make_adjustment_pct));
            println!("  Condition ({:<9}) {:>12}", grade, format_adjustment(result.condition_adjustment_pct));
            println!("  Mileage adjustment:  {:>12}", format_adjustment(result.mileage_adjustment_pct));
            println!("  Estimated value:     {:>12.2}", result.estimated_value);
            println!(
                "  Depreciation:        {:>12.2} ({:.1}%)",
                result.depreciation_total, result.depreciation_percent
            );
            Ok(())
        }
        Command::Compare => {
            let conn = open_database(&config.database_path)?;
            run_compare(&calculator, &get_all_vehicles(&conn)?)
        }
        Command::Suggest {
            make,
            year,
            condition,
        } => {
            let suggestion = calculator.get_price_suggestion(&make, year, &condition);

            println!("💰 {} {} ({} years old, {})", year, make, suggestion.vehicle_age, suggestion.condition_label);
            println!("   Suggested price: {:.2}", suggestion.suggested_price);
            println!(
                "   Range:           {:.2} - {:.2}",
                suggestion.suggested_min, suggestion.suggested_max
            );
            Ok(())
        }
        Command::Analytics { owner } => {
            let conn = open_database(&config.database_path)?;
            let vehicles = match owner {
                Some(owner) => get_vehicles_by_owner(&conn, &owner)?,
                None => get_all_vehicles(&conn)?,
            };
            println!("{}", VehicleAnalytics::new(vehicles).to_json()?);
            Ok(())
        }
        Command::Ui => run_ui_mode(&config.database_path, calculator),
    }
}

fn narrow(selected: Vec<&Vehicle>) -> VehicleManager {
    VehicleManager::from_vehicles(selected.into_iter().cloned().collect())
}

fn run_import(db_path: &Path, csv_path: &Path, actor: &str) -> Result<()> {
    println!("🗄️  Vehicle Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let vehicles = load_csv(csv_path)?;
    println!("✓ Loaded {} valid vehicles from CSV", vehicles.len());

    // 2. Open database
    println!("\n🔧 Opening database...");
    let conn = open_database(db_path)?;
    println!("✓ Database ready at {:?}", db_path);

    // 3. Insert vehicles
    println!("\n💾 Inserting vehicles...");
    let summary = insert_vehicles(&conn, &vehicles, actor)?;
    println!("✓ Inserted: {} vehicles", summary.inserted);
    println!("✓ Skipped duplicates: {}", summary.duplicates);

    // 4. Verify count
    let count = verify_count(&conn)?;
    println!("\n✅ Database contains {} vehicles", count);

    Ok(())
}

fn print_vehicles(manager: &VehicleManager) {
    if manager.is_empty() {
        println!("No vehicles found.");
        return;
    }

    println!(
        "{:<6} {:<14} {:<18} {:>12}  {}",
        "Year", "Make", "Model", "Price", "Id"
    );
    for vehicle in manager.get_all_vehicles() {
        println!(
            "{:<6} {:<14} {:<18} {:>12.2}  {}",
            vehicle.year, vehicle.make, vehicle.model, vehicle.price, vehicle.id
        );
    }
    println!("\n{} vehicles", manager.count());
}

fn run_compare(calculator: &PriceCalculator, vehicles: &[Vehicle]) -> Result<()> {
    let listings: Vec<VehicleListing> = vehicles
        .iter()
        .filter(|v| {
            if v.price == 0.0 {
                warn!("Skipping {} ({}): no asking price", v.label(), v.id);
                false
            } else {
                true
            }
        })
        .map(VehicleListing::from)
        .collect();

    let ranked = calculator.compare_vehicles(&listings)?;

    println!(
        "{:>4}  {:<32} {:>12} {:>12} {:>7}",
        "#", "Vehicle", "Asking", "Estimated", "Score"
    );
    for (rank, entry) in ranked.iter().enumerate() {
        println!(
            "{:>4}  {:<32} {:>12.2} {:>12.2} {:>6.1}%",
            rank + 1,
            entry.valuation.vehicle_label,
            entry.valuation.base_price,
            entry.valuation.estimated_value,
            entry.value_score
        );
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(db_path: &Path, calculator: PriceCalculator) -> Result<()> {
    println!("🖥️  Loading vehicle inventory...\n");

    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: vehicle-valuation import <file.csv>");
        eprintln!("   to import vehicles first.");
        std::process::exit(1);
    }

    let conn = open_database(db_path)?;
    let vehicles = get_all_vehicles(&conn)?;
    println!("✓ Loaded {} vehicles\n", vehicles.len());

    let mut app = ui::App::new(vehicles, calculator);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_db_path: &Path, _calculator: PriceCalculator) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin valuation-server --features server");
    std::process::exit(1);
}
