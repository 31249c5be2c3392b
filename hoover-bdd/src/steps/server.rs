//! Server lifecycle steps.

use anyhow::{Context, Result};
use cucumber::{given, when};
use tracing::info;

use crate::client::CLEANING_SESSIONS_PATH;
use crate::world::HooverWorld;

#[given("I have freshly started hoover web server instance")]
async fn freshly_started_server(world: &mut HooverWorld) -> Result<()> {
    let session = world.session()?;
    info!(endpoint = session.client().base_uri(), "Preparing fresh server");
    session
        .fresh_server()
        .await
        .context("hoover web server did not become ready")
}

#[given("the hoover web service running")]
async fn service_running(world: &mut HooverWorld) -> Result<()> {
    let session = world.session()?;
    session.client().get(CLEANING_SESSIONS_PATH).await?;
    Ok(())
}

#[when("I shut down the hoover web server instance")]
async fn shut_down_server(world: &mut HooverWorld) -> Result<()> {
    let session = world.session()?;
    session
        .shutdown()
        .await
        .context("hoover web server did not stop")
}
