use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use ncm_catalog::{
    detect_format, get_codec, Catalog, Outcome, OutcomeKind, Progress, Settings, SheetFormat,
    SortOrder, SqliteStore, XlsxCodec,
};

#[derive(Parser)]
#[command(name = "ncm-catalog", version, about = "NCM tariff catalog: import, export and maintain")]
struct Cli {
    /// Settings file (default: <config dir>/ncm-catalog/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides settings and NCM_CATALOG_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a spreadsheet (.xlsx, .xls, .ods, .csv), updating records by NCM
    Import { file: PathBuf },

    /// Export every record to a spreadsheet
    Export { file: PathBuf },

    /// List records, display formatted
    List {
        /// Only NCMs containing this text
        #[arg(long, default_value = "")]
        search: String,

        /// Sort NCM descending
        #[arg(long)]
        desc: bool,
    },

    /// Delete one record by id
    Delete { id: String },

    /// Delete every record
    DeleteAll {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.database_path = db;
    }

    let store = SqliteStore::open(&settings.database_path)?;
    let mut catalog = Catalog::open(store, settings.locale.clone())?;

    match cli.command {
        Command::Import { file } => run_import(&mut catalog, &file),
        Command::Export { file } => run_export(&catalog, &settings, &file),
        Command::List { search, desc } => {
            let order = if desc { SortOrder::Desc } else { SortOrder::Asc };
            run_list(&catalog, &search, order);
            Ok(())
        }
        Command::Delete { id } => {
            let result = catalog.delete(&id);
            report(&Outcome::of(OutcomeKind::Delete, &result));
            result
        }
        Command::DeleteAll { yes } => {
            if !yes {
                eprintln!("❌ Refusing to delete ALL records without --yes");
                std::process::exit(1);
            }
            let result = catalog.delete_all();
            if let Ok(count) = &result {
                println!("✓ {} records removed", count);
            }
            report(&Outcome::of(OutcomeKind::DeleteAll, &result));
            result.map(|_| ())
        }
    }
}

fn run_import(catalog: &mut Catalog<SqliteStore>, file: &Path) -> Result<()> {
    println!("📥 Spreadsheet Import - {}", file.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let format = detect_format(file)?;
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let codec = get_codec(format);

    let result = catalog.import(Some(bytes.as_slice()), codec.as_ref(), print_progress);
    println!();

    let outcome = Outcome::of_import(&result);
    report(&outcome);

    match result {
        Ok(summary) => {
            println!("✓ Created: {}", summary.created);
            println!("✓ Updated: {}", summary.updated);
            println!("✓ Skipped rows: {}", summary.skipped);
            println!("✓ Catalog now holds {} records", catalog.records().len());
            Ok(())
        }
        Err(e) => {
            if e.committed() > 0 {
                eprintln!("   {} rows were written before the failure", e.committed());
            }
            std::process::exit(1);
        }
    }
}

fn print_progress(progress: &Progress) {
    print!(
        "\r⏳ Importing... {:>3}% ({}/{})",
        progress.percent(),
        progress.processed,
        progress.total
    );
    let _ = std::io::stdout().flush();
}

fn run_export(catalog: &Catalog<SqliteStore>, settings: &Settings, file: &Path) -> Result<()> {
    let bytes = match detect_format(file)? {
        SheetFormat::Xlsx => {
            let codec = XlsxCodec::new().with_sheet_name(&settings.sheet_name);
            catalog.export_bytes(&codec)?
        }
        format => catalog.export_bytes(get_codec(format).as_ref())?,
    };

    std::fs::write(file, bytes)
        .with_context(|| format!("Failed to write file: {}", file.display()))?;

    println!("✓ Exported {} records to {}", catalog.records().len(), file.display());
    Ok(())
}

fn run_list(catalog: &Catalog<SqliteStore>, search: &str, order: SortOrder) {
    let views = catalog.query(search, order);

    println!("id | {}", catalog.display_headers().join(" | "));
    for view in &views {
        println!("{} | {}", view.record.id, catalog.display_row(&view.record).join(" | "));
    }
    println!("\n📊 {} of {} records", views.len(), catalog.records().len());
}

fn report(outcome: &Outcome) {
    if outcome.success {
        println!("✅ {}", outcome.message);
    } else {
        eprintln!("❌ {}", outcome.message);
    }
}
