use attic_storefront::flags::HttpDispatcher;
use attic_storefront::{
    render, sort_by, CatalogSource, Context, FetchOptions, FlagClient, Result, SortField,
    Storefront, StorefrontError, StorefrontView, DATAFILE_URL_ENV,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Attic & Button storefront, driven from the terminal.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and print the catalog grid
    Catalog {
        #[command(flatten)]
        out: Output,
        /// Catalog file path or http(s) URL
        #[arg(long, default_value = "items.csv")]
        catalog: String,
        #[arg(long, value_enum)]
        sort: Option<SortField>,
    },
    /// Run the shop flow for one user
    Shop(ShopArgs),
}

#[derive(Args, Debug)]
struct ShopArgs {
    #[command(flatten)]
    out: Output,
    /// User identifier
    #[arg(long)]
    user: String,
    /// Remote datafile URL
    #[arg(long, env = DATAFILE_URL_ENV)]
    datafile_url: Option<String>,
    /// Local datafile, instead of fetching one
    #[arg(long, conflicts_with = "datafile_url")]
    datafile_file: Option<PathBuf>,
    #[arg(long, default_value = "items.csv")]
    catalog: String,
    /// Sort option to pick once the selector is shown
    #[arg(long, value_enum)]
    sort: Option<SortField>,
    /// Buy the item at this grid position
    #[arg(long)]
    purchase: Option<usize>,
    /// Message shown when the feature has no welcome message
    #[arg(long)]
    fallback_message: Option<String>,
    /// POST conversion events here instead of logging them
    #[arg(long)]
    event_endpoint: Option<String>,
    /// Extra datafile fetch attempts on network errors and 5xx
    #[arg(long, default_value_t = 0)]
    retries: u32,
    /// Datafile fetch timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct Output {
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Html,
    Json,
}

enum Datafile {
    File(PathBuf),
    Url(String),
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments.
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Command::Catalog { out, catalog, sort } => run_catalog(&catalog, sort, out.format).await,
        Command::Shop(args) => run_shop(args).await,
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_catalog(catalog: &str, sort: Option<SortField>, format: Format) -> Result<()> {
    let ctx = Context::default();
    let load = CatalogSource::from_arg(catalog).load().await?;
    for rejected in &load.rejected {
        eprintln!("skipped: {rejected}");
    }
    let shown = match sort {
        Some(field) => sort_by(&load.catalog, field),
        None => load.catalog,
    };
    let grid = render(&shown, &ctx.image_prefix);
    match format {
        Format::Text => print!("{grid}"),
        Format::Html => println!("{}", grid.to_html()),
        Format::Json => println!("{}", to_json(&grid)?),
    }
    Ok(())
}

async fn run_shop(args: ShopArgs) -> Result<()> {
    let mut ctx = Context::default();
    if let Some(message) = args.fallback_message.as_deref() {
        ctx = ctx.with_fallback_message(message).with_feature_off_message(message);
    }

    // Resolve the flag configuration first; its absence is fatal.
    let datafile = match (args.datafile_file.clone(), args.datafile_url.clone()) {
        (Some(path), _) => Datafile::File(path),
        (None, Some(url)) => Datafile::Url(url),
        (None, None) => {
            return Err(StorefrontError::MissingConfig(format!(
                "pass --datafile-url, --datafile-file or set {DATAFILE_URL_ENV}"
            )))
        }
    };
    let opts = FetchOptions {
        timeout: Duration::from_secs(args.timeout),
        retries: args.retries,
        ..FetchOptions::default()
    };
    let http_dispatcher = args.event_endpoint.clone().map(HttpDispatcher::new);
    let dispatcher = http_dispatcher.clone();
    let flag_init = async move {
        let client = match datafile {
            Datafile::File(path) => {
                FlagClient::from_datafile(&tokio::fs::read_to_string(path).await?)?
            }
            Datafile::Url(url) => FlagClient::initialize_with(&url, &opts).await?,
        };
        Ok::<_, StorefrontError>(match dispatcher {
            Some(dispatcher) => client.with_dispatcher(dispatcher),
            None => client,
        })
    };

    let mut store = Storefront::new(ctx);
    let load = store
        .start(&CatalogSource::from_arg(&args.catalog), flag_init)
        .await?;
    for rejected in &load.rejected {
        eprintln!("skipped: {rejected}");
    }

    store.shop(&args.user)?;
    if let Some(field) = args.sort {
        match store.select_sort(field) {
            Ok(_) => {}
            Err(StorefrontError::SortingUnavailable) => {
                eprintln!("sorting is off for {}; showing catalog order", args.user);
            }
            Err(e) => return Err(e),
        }
    }
    if let Some(item) = args.purchase {
        let control = store
            .view()
            .grid
            .control(item)
            .ok_or(StorefrontError::UnknownItem(item))?;
        store.purchase(control)?;
    }
    if let Some(dispatcher) = &http_dispatcher {
        dispatcher.flush().await;
    }

    print_view(store.view(), args.out.format)
}

fn print_view(view: &StorefrontView, format: Format) -> Result<()> {
    match format {
        Format::Text => {
            println!("{}", view.indicator);
            println!("{}", view.welcome);
            match &view.sort_selector {
                Some(selector) => {
                    let current = selector.selected.map(|f| f.label()).unwrap_or("-");
                    println!("{}{current}", selector.label);
                }
                None => println!("(sorting unavailable)"),
            }
            print!("{}", view.grid);
            println!("location: {}", view.location);
        }
        Format::Html => println!("{}", view.to_html()),
        Format::Json => println!("{}", to_json(view)?),
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| StorefrontError::Io(e.into()))
}
