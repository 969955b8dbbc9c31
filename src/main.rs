use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use open_proxy_harvester::{
    logging::init_tracing,
    proxy::{FormatKind, ProxyParser, ProxyType, TimestampedFileSink},
    tui::{ProxyCheckerApp, SourcePicker},
    Config, Harvester, PipelineError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Harvest free proxies from public lists and keep the working ones
#[derive(Parser)]
#[command(name = "open-proxy-harvester")]
#[command(about = "Harvest free proxies from public lists and keep the working ones")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, test and save proxies (default)
    Run(RunArgs),
    /// List the available proxy sources
    Sources,
    /// Parse a saved source response and print the proxies found
    Parse {
        /// File containing a source response
        input: PathBuf,
        /// Response format (json, text, html)
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Proxy type for text responses (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Source keys to use, comma separated (see `sources`)
    #[arg(short, long, value_delimiter = ',')]
    sources: Vec<String>,
    /// Use every source
    #[arg(short, long, conflicts_with = "sources")]
    all: bool,
    /// Show the live verification dashboard
    #[arg(long)]
    tui: bool,
    /// Number of proxies tested at once
    #[arg(short = 'n', long)]
    threads: Option<usize>,
    /// Directory for the working proxy list
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<PipelineError>() {
                Some(PipelineError::NoWorkingProxies { .. }) => warn!("{}", e),
                Some(PipelineError::NoProxiesFound) => error!("No proxies found. Exiting."),
                _ => error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Some(Commands::Run(args)) => run(args, config).await,
        None => run(RunArgs::default(), config).await,
        Some(Commands::Sources) => {
            let harvester = Harvester::from_config(&config)?;
            for source in harvester.registry().sources() {
                println!("[{:>2}] {} ({})", source.key, source.name, source.format);
                println!("     {}", source.url);
            }
            Ok(())
        }
        Some(Commands::Parse {
            input,
            format,
            proxy_type,
        }) => {
            let kind = parse_format(&format, proxy_type.parse()?)?;
            let proxies = ProxyParser::parse_file(&input, kind)?;

            println!("Parsed {} proxies from {:?}", proxies.len(), input);
            for proxy in &proxies {
                println!("{}", proxy.to_output_line());
            }
            Ok(())
        }
    }
}

async fn run(args: RunArgs, mut config: Config) -> Result<()> {
    if let Some(threads) = args.threads {
        config.check_concurrency = threads.max(1);
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    let harvester = Harvester::from_config(&config)?;

    let keys: Vec<String> = if args.all {
        harvester
            .registry()
            .sources()
            .iter()
            .map(|s| s.key.clone())
            .collect()
    } else if !args.sources.is_empty() {
        args.sources
    } else {
        match SourcePicker::new(harvester.registry()).run()? {
            Some(keys) => keys,
            None => {
                info!("No sources selected, nothing to do");
                return Ok(());
            }
        }
    };

    info!("Proxy harvester started");
    let mut sink = TimestampedFileSink::new(&config.output_dir);

    if args.tui {
        let checker = harvester.checker().clone();
        harvester
            .run_with(&keys, &mut sink, move |proxies| {
                ProxyCheckerApp::new(proxies, checker).run()
            })
            .await?;
    } else {
        harvester.run(&keys, &mut sink).await?;
    }

    Ok(())
}

fn parse_format(s: &str, scheme: ProxyType) -> Result<FormatKind> {
    match s.to_lowercase().as_str() {
        "json" => Ok(FormatKind::JsonList),
        "text" | "txt" => Ok(FormatKind::PlainText { scheme }),
        "html" => Ok(FormatKind::HtmlTable),
        _ => Err(anyhow!("Invalid format: {}. Use: json, text, html", s)),
    }
}
