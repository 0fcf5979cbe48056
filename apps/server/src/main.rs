use agora_config::load as load_config;
use agora_runtime::{telemetry, CommunityServices};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

mod seed;

#[derive(Parser)]
#[command(name = "agora-backend")]
#[command(about = "Agora community store maintenance (stats by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Seed the database with demo communities
    Seed,
    /// Print row counts for the main tables (default)
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config().context("failed to load configuration")?;
    telemetry::init_tracing(&config.logging).context("failed to initialise tracing")?;

    // initialising the services applies migrations
    let services = CommunityServices::initialise(&config)
        .await
        .context("failed to initialise community services")?;

    let outcome = match cli.command.unwrap_or(Commands::Stats) {
        Commands::Migrate => {
            info!(url = %config.database.url, "database schema is up to date");
            println!("Migrations applied to {}", config.database.url);
            Ok(())
        }
        Commands::Seed => seed_data(&services).await,
        Commands::Stats => print_stats(&services).await,
    };

    services.shutdown().await;
    outcome
}

async fn seed_data(services: &CommunityServices) -> anyhow::Result<()> {
    info!("seeding database with demo data");

    match seed::seed(services).await? {
        Some(summary) => {
            println!("Database seeded:");
            println!("- {} categories", summary.categories);
            println!("- {} communities", summary.communities);
            println!("- {} memberships", summary.members);
            println!("- {} rules", summary.rules);
            println!("- {} pending join requests", summary.join_requests);
        }
        None => println!("Communities already exist; nothing seeded"),
    }

    Ok(())
}

async fn print_stats(services: &CommunityServices) -> anyhow::Result<()> {
    let communities = services
        .communities
        .count_all()
        .await
        .context("failed to count communities")?;
    let categories = services
        .categories
        .list()
        .await
        .context("failed to list categories")?
        .len();

    println!("=== AGORA ===");
    println!("{:<22} {}", "communities", communities);
    println!("{:<22} {}", "categories", categories);

    for (label, sql) in [
        (
            "memberships",
            "SELECT COUNT(*) FROM community_members WHERE deleted_at IS NULL",
        ),
        (
            "pending requests",
            "SELECT COUNT(*) FROM community_join_requests WHERE status = 'pending'",
        ),
        ("rules", "SELECT COUNT(*) FROM community_rules"),
        ("chats", "SELECT COUNT(*) FROM chats WHERE deleted_at IS NULL"),
        ("messages", "SELECT COUNT(*) FROM messages WHERE deleted_at IS NULL"),
    ] {
        let count: i64 = sqlx::query_scalar(sql)
            .fetch_one(&services.db_pool)
            .await
            .with_context(|| format!("failed to count {label}"))?;
        println!("{label:<22} {count}");
    }

    Ok(())
}
