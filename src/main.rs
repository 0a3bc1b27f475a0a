use clap::{Parser, Subcommand};
use smartstore::{QuerySpec, SmartStore, StoreConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "smartstore")]
#[command(about = "SmartStore - JSON document soups on SQLite", long_about = None)]
struct Cli {
    /// Database file
    #[arg(long, env = "SMARTSTORE_DB")]
    db: PathBuf,

    /// Directory holding smartstore.toml and .env (defaults to the database directory)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List soups with their index specs
    Soups,
    /// List unfinished long operations
    Pending,
    /// Resume unfinished long operations
    Resume,
    /// Show database and external storage sizes
    Usage,
    /// Run a read-only Smart SQL query and print one JSON row per line
    Query {
        sql: String,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smartstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_dir = cli.config.clone().unwrap_or_else(|| {
        cli.db
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let mut config = StoreConfig::load(&config_dir)?;
    // Resume only on request
    config.resume_long_operations_on_open = false;

    let store = SmartStore::open(&cli.db, config)?;

    match cli.command {
        Command::Soups => {
            for name in store.get_all_soup_names()? {
                let spec = store.get_soup_spec(&name)?;
                let specs: Vec<String> = store
                    .get_soup_index_specs(&name)?
                    .iter()
                    .map(|s| format!("{}:{}", s.path, s.index_type.as_str()))
                    .collect();
                let features: Vec<&str> = spec.features.iter().map(String::as_str).collect();
                println!("{}\t[{}]\t{}", name, features.join(","), specs.join(" "));
            }
        }
        Command::Pending => {
            let operations = store.get_long_operations()?;
            if operations.is_empty() {
                println!("No pending operations");
            }
            for op in operations {
                println!("{}\t{}\t{}", op.soup_name(), op.operation_type(), op.status());
            }
        }
        Command::Resume => {
            let completed = store.resume_long_operations()?;
            println!("Resumed {} operation(s)", completed);
        }
        Command::Usage => {
            println!("database\t{}", store.database_size());
            println!("external\t{}", store.external_storage_size());
        }
        Command::Query {
            sql,
            page_size,
            page,
        } => {
            let spec = QuerySpec::smart(&sql, page_size);
            for row in store.query(&spec, page)? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
    }

    store.close()?;
    Ok(())
}
