use anyhow::Result;
use clap::Parser;
use gmail_sweep::cli::{self, Cli, Commands};
use gmail_sweep::config::Config;
use gmail_sweep::error::GmailError;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        let auth_failed = e
            .downcast_ref::<GmailError>()
            .is_some_and(GmailError::is_authorization_error);
        if auth_failed {
            eprintln!("\nTo authorize again, run: gmail-sweep auth --force");
        } else {
            eprintln!("\nFor help, run: gmail-sweep --help");
        }
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Both the API client and the authenticator use rustls; pick one provider up front
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_sweep=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_sweep=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authorizing access to Gmail API...");

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let config = Config::load(&cli.config).await?;
            let hub = gmail_sweep::auth::initialize_gmail_hub(
                &cli.credentials,
                &cli.token_cache,
                &config.auth,
            )
            .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Same scope as the authorization so no second consent is triggered
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope(gmail_sweep::client::MODIFY_SCOPE)
                .doit()
                .await
                .map_err(GmailError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Run { overrides, report } => {
            if overrides.dry_run {
                println!("Running in DRY RUN mode - no changes will be made");
            }

            let summary = cli::run_sweep(&cli, overrides, report.as_ref()).await?;

            println!("\n========================================");
            println!("Sweep Summary");
            println!("========================================");
            println!("Run ID: {}", summary.run_id);
            println!("Query: {}", summary.query);
            println!("Duration: {:.1} seconds", summary.elapsed.as_secs_f64());
            println!("Pages listed: {}", summary.pages);
            println!("Messages enqueued: {}", summary.enqueued);
            println!("Messages modified: {}", summary.succeeded());
            println!("Messages failed: {}", summary.failed);
            for failure in summary.failures.iter().take(20) {
                println!("  - {} (worker {}): {}", failure.id, failure.worker, failure.error);
            }
            if summary.failures.len() > 20 {
                println!("  ... and {} more", summary.failures.len() - 20);
            }
            println!("========================================");

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - query.filter: Gmail search query selecting messages");
            println!("  - labels.add / labels.remove: label IDs to change");
            println!("  - pipeline.workers: number of concurrent workers");
            println!("  - auth.redirect_addr: must match the registered redirect URL");

            Ok(())
        }
    }
}
