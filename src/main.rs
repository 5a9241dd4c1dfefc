use clap::Parser;
use product_scout::config::ScoutConfig;
use product_scout::error::Result;
use product_scout::pipeline::{self, Scout};
use std::process::ExitCode;

mod args;
use args::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --log-level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.as_filter()),
    )
    .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ::log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ScoutConfig::from_file(path)?,
        None => ScoutConfig::default(),
    };
    config.apply_env();

    match args.command {
        Command::Scrape(scrape) => {
            scrape.apply(&mut config);
            println!("Note: Scraping requires a WebDriver server (e.g., ChromeDriver).");
            println!(
                "Set WEBDRIVER_URL environment variable if not using the default {}",
                config.browser.webdriver_url
            );

            ::log::info!("Products to collect: {}", config.count);
            if config.search.categories.is_empty() {
                ::log::info!("No specific categories provided, using defaults");
            } else {
                ::log::info!("Categories: {}", config.search.categories.join(", "));
            }
            ::log::info!("Search engine: {}", config.search.search_url);

            let summary = Scout::launch(config).await?.run().await?;
            ::log::info!(
                "Run {} collected {} products in {} attempts",
                summary.run_id,
                summary.products,
                summary.attempts
            );
            if let Some(path) = summary.products_path {
                println!("Saved {} products to {}", summary.products, path.display());
            }
            if !summary.submissions.is_empty() {
                let succeeded = summary.submissions.iter().filter(|r| r.success).count();
                println!("Submitted {}/{} listings", succeeded, summary.submissions.len());
            }
        }
        Command::Submit(submit) => {
            submit.apply(&mut config);
            let results = pipeline::submit_file(&config, &submit.file).await?;
            for result in &results {
                match (&result.listing_id, &result.error) {
                    (Some(id), _) => println!("{} -> {}", result.product_title, id),
                    (None, Some(error)) => println!("{} failed: {}", result.product_title, error),
                    (None, None) => println!("{} submitted", result.product_title),
                }
            }
        }
        Command::Generate(generate) => {
            generate.apply(&mut config);
            let path = pipeline::generate_listings(
                &config,
                &generate.search_term,
                &generate.category,
                generate.count,
            )
            .await?;
            println!("Listings saved to {}", path.display());
        }
    }
    Ok(())
}
