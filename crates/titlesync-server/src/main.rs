use clap::{Parser, Subcommand};
use titlesync_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use titlesync_server::{
    HolderId, MAX_TITLES, RedeemOutcome, TitleRuntime, format_selected_title, observability,
};

/// Title service with a coherent PostgreSQL / Redis cache.
#[derive(Debug, Parser)]
#[command(name = "titlesync", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "TITLESYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the service and keep the invalidation listener alive until Ctrl-C
    Serve,
    /// Grant a title to a holder
    Grant { holder: HolderId, title: String },
    /// Revoke a title from a holder
    Revoke { holder: HolderId, title: String },
    /// Select one of the holder's titles
    Equip { holder: HolderId, title: String },
    /// Clear the holder's selection
    Unequip { holder: HolderId },
    /// Print the holder's titles and selection
    Show { holder: HolderId },
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    observability::init_tracing();

    let cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %cli.config, "Configuration loaded");
    observability::apply_logging_level(&cfg.logging.level);

    let runtime = match TitleRuntime::start(&cfg).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Startup failed: {e:#}");
            std::process::exit(2);
        }
    };

    let outcome = run(&runtime, cli.command).await;
    runtime.shutdown().await;

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(runtime: &TitleRuntime, command: Command) -> anyhow::Result<()> {
    let service = runtime.service();
    match command {
        Command::Serve => {
            tracing::info!("titlesync serving, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
        Command::Grant { holder, title } => {
            match service.redeem_title(holder, &title).await? {
                RedeemOutcome::Granted => println!("granted {title} to {holder}"),
                RedeemOutcome::AlreadyOwned => println!("{holder} already had {title}"),
                RedeemOutcome::CollectionFull => {
                    anyhow::bail!("title collection of {holder} is full ({MAX_TITLES} titles)")
                }
            }
        }
        Command::Revoke { holder, title } => {
            if service.delete_title(holder, &title).await? {
                println!("revoked {title} from {holder}");
            } else {
                println!("{holder} does not own {title}");
            }
        }
        Command::Equip { holder, title } => {
            if !service.has_title(holder, &title).await? {
                anyhow::bail!("{holder} does not own {title}");
            }
            service.equip_title(holder, &title).await?;
            println!("{holder} now shows {}", format_selected_title(Some(title.as_str())));
        }
        Command::Unequip { holder } => {
            service.unequip_title(holder).await?;
            println!("cleared selection of {holder}");
        }
        Command::Show { holder } => {
            let titles = service.load_titles(holder).await?;
            let selected = service.get_selected_title(holder).await?;
            println!("{holder}: {} titles", titles.len());
            for record in titles.titles_by_acquisition() {
                let marker = if selected.as_deref() == Some(record.title.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {} (acquired {})", record.title, record.acquired_at);
            }
        }
    }
    Ok(())
}
