use crate::{hint, model::Status, BoardState, Meld, MeldType, Tile};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// JSON-serializable representation of a meld
#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MeldJson {
    #[serde(rename = "group")]
    Group { tiles: Vec<String> },
    #[serde(rename = "run")]
    Run { tiles: Vec<String> },
}

/// Result of a hint request
#[derive(Serialize, Deserialize)]
pub struct HintResult {
    /// The request was understood; a board without a play is still a success
    pub success: bool,
    /// Rack tiles to play; empty means the player has to draw
    pub playable: Vec<String>,
    pub sequences: Vec<MeldJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tiles or points played, depending on the strategy
    pub objective: u32,
}

/// Main WASM API: compute a hint for a board state
///
/// # Arguments
/// * `table_tiles` - JSON array of tile strings on the table (e.g., ["r1", "r2", "r4"])
/// * `rack_tiles` - JSON array of tile strings on the rack (e.g., ["r3", "?"])
/// * `first_turn` - Whether the player still has to open
/// * `options` - JSON object with optional `strategy` ("maximize_tiles" or
///   "maximize_points"), `opening_rule` ("constrain" or "filter"),
///   `opening_score` and `max_ms`; may be empty
///
/// # Returns
/// JSON string with HintResult
#[wasm_bindgen]
pub fn hint_rummikub(table_tiles: &str, rack_tiles: &str, first_turn: bool, options: &str) -> String {
    let result = hint_internal(table_tiles, rack_tiles, first_turn, options).unwrap_or_else(|e| {
        HintResult {
            success: false,
            playable: Vec::new(),
            sequences: Vec::new(),
            status: None,
            error: Some(e),
            objective: 0,
        }
    });
    serde_json::to_string(&result)
        .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"Serialization error: {}"}}"#, e))
}

/// Internal implementation of hint_rummikub
fn hint_internal(
    table_tiles: &str,
    rack_tiles: &str,
    first_turn: bool,
    options: &str,
) -> Result<HintResult, String> {
    let table = parse_tile_json(table_tiles, "table")?;
    let rack = parse_tile_json(rack_tiles, "rack")?;

    let options: hint::HintOptions = if options.trim().is_empty() {
        hint::HintOptions::default()
    } else {
        serde_json::from_str(options).map_err(|e| format!("Invalid options JSON: {}", e))?
    };

    let state = BoardState::new(table, rack, first_turn);
    let report = hint::hint_with_options(&state, &options);

    Ok(HintResult {
        success: true,
        playable: report.hint.playable.iter().map(Tile::to_string).collect(),
        sequences: report.hint.sequences.iter().map(meld_to_json).collect(),
        status: Some(status_name(report.status).to_string()),
        error: None,
        objective: report.objective,
    })
}

fn parse_tile_json(json: &str, what: &str) -> Result<Vec<Tile>, String> {
    let strs: Vec<String> =
        serde_json::from_str(json).map_err(|e| format!("Invalid {} JSON: {}", what, e))?;
    strs.iter().map(|s| Tile::from_string(s)).collect()
}

fn status_name(status: Status) -> &'static str {
    match status {
        Status::Optimal => "optimal",
        Status::Feasible => "feasible",
        Status::Infeasible => "infeasible",
        Status::Unknown => "unknown",
    }
}

/// Convert internal Meld to JSON representation
fn meld_to_json(meld: &Meld) -> MeldJson {
    let tiles: Vec<String> = meld.tiles.iter().map(Tile::to_string).collect();

    match meld.meld_type {
        MeldType::Group => MeldJson::Group { tiles },
        MeldType::Run => MeldJson::Run { tiles },
    }
}

/// Get the git commit hash that this WASM module was built from
///
/// Returns the first 8 characters of the commit hash, or "unknown" if not available
#[wasm_bindgen]
pub fn get_build_commit() -> String {
    env!("BUILD_COMMIT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_hint_json() {
        let json = hint_rummikub(r#"["r1","r2","r4"]"#, r#"["r3"]"#, false, "");
        let result: HintResult = serde_json::from_str(&json).unwrap();
        assert!(result.success);
        assert_eq!(result.playable, vec!["r3"]);
        assert_eq!(result.sequences.len(), 1);
        assert_eq!(result.status.as_deref(), Some("optimal"));
    }

    #[wasm_bindgen_test]
    fn test_hint_json_infeasible_board_is_not_an_error() {
        let json = hint_rummikub(r#"["r1","r2"]"#, r#"["b7"]"#, false, "");
        let result: HintResult = serde_json::from_str(&json).unwrap();
        assert!(result.success);
        assert!(result.error.is_none());
        assert!(result.playable.is_empty());
        assert_eq!(result.status.as_deref(), Some("infeasible"));
    }

    #[wasm_bindgen_test]
    fn test_hint_json_rejects_bad_tile() {
        let json = hint_rummikub(r#"["r14"]"#, "[]", false, "");
        let result: HintResult = serde_json::from_str(&json).unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("1-13"));
    }
}
