//! Tools exposed via Model Context Protocol
//!
//! Provides the `travel_planner` implementation: place candidates are gathered,
//! rendered into a prompt, streamed through the generator and repaired into a
//! single JSON itinerary.

use rust_mcp_sdk::{macros, schema::Tool};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::{
    places::{build_candidates_json, sample_candidates, PlaceQuery},
    prompt::build_travel_prompt,
    repair::normalize_and_validate,
};
use crate::{errors::AppError, AppState};

pub const TRAVEL_PLANNER: &str = "travel_planner";

pub const DEFAULT_DESTINATION: &str = "Seoul";
pub const DEFAULT_DURATION: u32 = 3;
pub const DEFAULT_DAILY_BUDGET: u64 = 100_000;
pub const DEFAULT_INTENSITY: &str = "medium";
pub const MAX_DURATION: u32 = 10;

#[macros::mcp_tool(
    name = "travel_planner",
    description = "Generate a day-by-day travel itinerary for a destination as one JSON document"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct TravelPlannerTool {
    pub destination: Option<String>,
    pub duration: Option<u32>,
    pub daily_budget: Option<u64>,
    pub intensity: Option<String>,
    pub preferences: Option<String>,
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![TravelPlannerTool::tool()]
}

/// Tool arguments with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelRequest {
    pub destination: String,
    pub duration: u32,
    pub daily_budget: u64,
    pub intensity: String,
    pub preferences: Vec<String>,
}

impl TravelRequest {
    pub fn from_arguments(arguments: Map<String, Value>) -> Result<Self, AppError> {
        let params: TravelPlannerTool = serde_json::from_value(Value::Object(arguments))
            .map_err(|err| AppError::invalid_arguments(err.to_string()))?;

        let duration = params.duration.unwrap_or(DEFAULT_DURATION);
        if duration == 0 || duration > MAX_DURATION {
            return Err(AppError::invalid_arguments(format!(
                "duration must be between 1 and {MAX_DURATION}"
            )));
        }

        let destination = params
            .destination
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_DESTINATION.to_string());
        let intensity = params
            .intensity
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_INTENSITY.to_string());
        let preferences = params
            .preferences
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            destination,
            duration,
            daily_budget: params.daily_budget.unwrap_or(DEFAULT_DAILY_BUDGET),
            intensity,
            preferences,
        })
    }

    pub fn total_budget(&self) -> u64 {
        self.daily_budget.saturating_mul(u64::from(self.duration))
    }
}

/// Routes a `tools/call` to its handler and returns the JSON document text.
pub async fn handle_tool_call(
    state: &AppState,
    name: &str,
    arguments: Map<String, Value>,
) -> Result<String, AppError> {
    match name {
        TRAVEL_PLANNER => handle_travel_planner(state, arguments).await,
        other => Err(AppError::UnknownTool(other.to_string())),
    }
}

pub async fn handle_travel_planner(
    state: &AppState,
    arguments: Map<String, Value>,
) -> Result<String, AppError> {
    let request = TravelRequest::from_arguments(arguments)?;
    info!(
        destination = %request.destination,
        duration = request.duration,
        intensity = %request.intensity,
        "planning itinerary"
    );

    let query = PlaceQuery::new(&request.destination, &request.intensity);
    let places = match state.place_provider.search(&query).await {
        Ok(places) if !places.is_empty() => places,
        Ok(_) => {
            warn!(
                destination = %request.destination,
                "place search found nothing, using sample candidates"
            );
            sample_candidates()
        }
        Err(err) => {
            warn!(
                destination = %request.destination,
                error = %err,
                "place search failed, using sample candidates"
            );
            sample_candidates()
        }
    };

    let candidates_json = build_candidates_json(&request.destination, &places);
    let prompt = build_travel_prompt(&request, &candidates_json);

    let outcome = state
        .generator
        .generate(&prompt, state.generation_timeout)
        .await?;
    if !outcome.is_completed() {
        warn!(
            len = outcome.text().len(),
            "itinerary stream ended before the document closed"
        );
    }

    normalize_and_validate(
        state.generator.as_ref(),
        outcome.text(),
        state.generation_timeout,
    )
    .await
}
