//! Seeds the configured store with random rules plus the edge-case fixtures.

use anyhow::Context;
use firewall_rules::database::Database;
use firewall_rules::models::config::AppConfig;
use firewall_rules::services::fixtures::{edge_cases, populate, random_rules};
use firewall_rules::utils::logging::{init_logging, LogBuffer};

const RANDOM_RULES_PER_TYPE: usize = 6;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env().context("Invalid environment variables")?;
    init_logging(config.env, LogBuffer::default()).context("Logger initialization failed")?;

    let database = Database::new(config.store_settings());
    database
        .connect_with_retry()
        .await
        .context("Database connection retry budget exhausted")?;

    let mut fixtures = random_rules(&mut rand::thread_rng(), RANDOM_RULES_PER_TYPE);
    fixtures.extend(edge_cases());

    populate(&database, fixtures)
        .await
        .context("Error inserting fixture firewall rules")?;
    Ok(())
}
