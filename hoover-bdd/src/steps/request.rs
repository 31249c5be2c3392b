//! Steps that build the cleaning session request and send it.

use anyhow::{Context, Result, bail};
use cucumber::gherkin::Step;
use cucumber::{given, when};
use serde_json::{Number, Value, json};
use tracing::debug;

use crate::world::HooverWorld;

#[given(expr = "I have a room with {int} width units and {int} height units")]
async fn room_size(world: &mut HooverWorld, width: i64, height: i64) -> Result<()> {
    set_request_field(world, "roomSize", json!([width, height])).await
}

#[given(expr = "I have a hoover at coordinates {int} width units and {int} height units")]
async fn hoover_coords(world: &mut HooverWorld, x: i64, y: i64) -> Result<()> {
    set_request_field(world, "coords", json!([x, y])).await
}

#[given("I have no dirt to clean")]
async fn no_dirt(world: &mut HooverWorld) -> Result<()> {
    set_request_field(world, "patches", json!([])).await
}

#[given("I have dirt to clean at some coordinates")]
async fn dirt_patches(world: &mut HooverWorld, step: &Step) -> Result<()> {
    let table = step
        .table
        .as_ref()
        .context("expected a data table with width_units and height_units columns")?;
    let new_patches = patch_rows(&table.rows)?;

    let session = world.session()?;
    let mut state = session.state().await;
    let patches = state
        .request
        .entry("patches")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !patches.is_array() {
        *patches = Value::Array(Vec::new());
    }
    if let Value::Array(items) = patches {
        items.extend(new_patches);
    }
    Ok(())
}

#[when(regex = r#"^I give cleaning instructions to move ([^\s"']+)$"#)]
async fn move_word(world: &mut HooverWorld, instructions: String) -> Result<()> {
    send_instructions(world, instructions).await
}

#[when(expr = "I give cleaning instructions to move {string}")]
async fn move_string(world: &mut HooverWorld, instructions: String) -> Result<()> {
    send_instructions(world, unquote(&instructions).to_string()).await
}

async fn set_request_field(world: &HooverWorld, key: &str, value: Value) -> Result<()> {
    let session = world.session()?;
    session.state().await.request.insert(key.to_string(), value);
    Ok(())
}

async fn send_instructions(world: &HooverWorld, instructions: String) -> Result<()> {
    let session = world.session()?;
    let request = {
        let mut state = session.state().await;
        state
            .request
            .insert("instructions".to_string(), Value::String(instructions));
        state.request.clone()
    };
    debug!(payload = %serde_json::Value::Object(request.clone()), "Payload to send");

    let response = session.client().post_cleaning_session(&request).await?;
    session.state().await.response = Some(response);
    Ok(())
}

/// Converts a data table with a header row into `[width, height]` pairs.
fn patch_rows(rows: &[Vec<String>]) -> Result<Vec<Value>> {
    let Some((header, body)) = rows.split_first() else {
        bail!("patch table is empty");
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("patch table has no `{name}` column"))
    };
    let width = column("width_units")?;
    let height = column("height_units")?;

    body.iter()
        .enumerate()
        .map(|(i, row)| -> Result<Value> {
            let cell = |idx: usize| {
                row.get(idx)
                    .map(String::as_str)
                    .with_context(|| format!("patch row {} is missing a column", i + 1))
            };
            Ok(json!([patch_value(cell(width)?), patch_value(cell(height)?)]))
        })
        .collect()
}

/// A number when the cell round-trips through one unchanged, else the raw
/// text, so malformed input reaches the service as written.
fn patch_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        if n.to_string() == raw {
            return Value::from(n);
        }
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.to_string() == raw {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(raw.to_string())
}

/// Strips one pair of matching surrounding quotes.
fn unquote(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_patch_rows_by_header() {
        let rows = table(&[
            &["height_units", "width_units"],
            &["2", "1"],
            &["3", "2"],
        ]);
        let patches = patch_rows(&rows).unwrap();
        assert_eq!(patches, vec![json!([1, 2]), json!([2, 3])]);
    }

    #[test]
    fn test_patch_values_that_do_not_round_trip_stay_text() {
        assert_eq!(patch_value("5"), json!(5));
        assert_eq!(patch_value("-1"), json!(-1));
        assert_eq!(patch_value("1.5"), json!(1.5));
        assert_eq!(patch_value("05"), json!("05"));
        assert_eq!(patch_value("x"), json!("x"));
        assert_eq!(patch_value(""), json!(""));
    }

    #[test]
    fn test_patch_rows_requires_columns() {
        let rows = table(&[&["x", "y"], &["1", "2"]]);
        let err = patch_rows(&rows).unwrap_err();
        assert!(err.to_string().contains("width_units"));
        assert!(patch_rows(&[]).is_err());
    }

    #[test]
    fn test_patch_rows_short_row() {
        let rows = table(&[&["width_units", "height_units"], &["1"]]);
        assert!(patch_rows(&rows).is_err());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"NNESEESWNWW\""), "NNESEESWNWW");
        assert_eq!(unquote("'NN'"), "NN");
        assert_eq!(unquote("NN"), "NN");
        assert_eq!(unquote("\"NN'"), "\"NN'");
    }
}
