//! Assertions on the last cleaning session response.

use anyhow::{Context, Result, ensure};
use cucumber::then;
use hoover_common::RecordedResponse;
use serde_json::{Value, json};

use crate::world::HooverWorld;

#[then(expr = "I should see that total number of clean spots is {int}")]
async fn clean_spots(world: &mut HooverWorld, patches: i64) -> Result<()> {
    let response = last_response(world).await?;
    expect_field(&response, "patches", &json!(patches))
}

#[then(expr = "I should see a hoover at coordinates {int} width units and {int} height units")]
async fn hoover_position(world: &mut HooverWorld, x: i64, y: i64) -> Result<()> {
    let response = last_response(world).await?;
    expect_field(&response, "coords", &json!([x, y]))
}

#[then(expr = "the response status should be {int}")]
async fn response_status(world: &mut HooverWorld, status: u16) -> Result<()> {
    let response = last_response(world).await?;
    ensure!(
        response.status == status,
        "expected status {status}, got {} with body {}",
        response.status,
        response.body
    );
    Ok(())
}

async fn last_response(world: &HooverWorld) -> Result<RecordedResponse> {
    let session = world.session()?;
    let state = session.state().await;
    state
        .response
        .clone()
        .context("no response recorded; send cleaning instructions first")
}

/// Requires a 200 response whose body has `field` equal to `expected`.
fn expect_field(response: &RecordedResponse, field: &str, expected: &Value) -> Result<()> {
    ensure!(
        response.status == 200,
        "expected status 200, got {} with body {}",
        response.status,
        response.body
    );
    let actual = response
        .body
        .get(field)
        .with_context(|| format!("response body has no `{field}` field: {}", response.body))?;
    ensure!(
        actual == expected,
        "expected `{field}` to be {expected}, got {actual}"
    );
    Ok(())
}
