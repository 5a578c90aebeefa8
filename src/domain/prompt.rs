//! Prompt text for itinerary generation and JSON repair.

use crate::domain::tools::TravelRequest;

/// Activities planned per day; the schema below fixes one per slot.
pub const DAILY_SLOTS: [(&str, &str); 5] = [
    ("08:00", "breakfast"),
    ("10:00", "sightseeing"),
    ("12:00", "lunch"),
    ("15:00", "coffee break"),
    ("18:00", "dinner"),
];

pub fn build_travel_prompt(request: &TravelRequest, candidates_json: &str) -> String {
    let destination = &request.destination;
    let duration = request.duration;
    let daily_budget = request.daily_budget;
    let total_budget = request.total_budget();
    let total_activities = DAILY_SLOTS.len() as u64 * u64::from(duration);
    let slots = DAILY_SLOTS
        .iter()
        .map(|(time, label)| format!("{time} ({label})"))
        .collect::<Vec<_>>()
        .join(", ");
    let preferences = if request.preferences.is_empty() {
        "none".to_string()
    } else {
        request.preferences.join(", ")
    };

    format!(
        r#"Create a {duration}-day travel plan for {destination} as exactly one JSON object.

Input candidates:
{candidates_json}

[Required rules]
- Exactly {slot_count} activities per day at fixed times: {slots}
- Type mapping: 08:00/12:00/18:00=RESTAURANT, 10:00=ATTRACTION, 15:00=CAFE
- Copy name/lat/lng/address/type/rating of every activity from one and the same input candidate; never invent places
- Skip candidates rated below 3.5 and use each candidate at most once per day
- Total budget: {total_budget} (daily {daily_budget}); keep travel between activities short
- Pace: {intensity}; traveller preferences: {preferences}

[Forbidden]
- Comments, explanations, or ellipses (...)
- Trailing commas at the end of arrays or objects
- Keys that are not part of the schema

[Output schema (fixed keys)]
{{
  "destination": "{destination}",
  "duration": {duration},
  "totalBudget": {total_budget},
  "itinerary": [
    {{
      "day": 1,
      "date": null,
      "activities": [
        {{
          "time": "08:00",
          "type": "RESTAURANT",
          "name": "",
          "description": "breakfast",
          "location": {{ "lat": 0, "lng": 0, "address": "" }},
          "duration": 60,
          "cost": 0,
          "rating": 0
        }}
      ],
      "dailyCost": 0
    }}
  ],
  "summary": {{
    "totalCost": 0,
    "totalActivities": {total_activities},
    "typeCount": {{ "RESTAURANT": 0, "ATTRACTION": 0, "CAFE": 0 }},
    "averageRating": 0
  }}
}}

Output only one complete JSON object following the schema above, covering day 1 to day {duration}."#,
        slot_count = DAILY_SLOTS.len(),
        intensity = request.intensity,
    )
}

/// Asks for the same document with its syntax fixed and nothing else changed.
pub fn build_repair_prompt(broken: &str) -> String {
    format!(
        "The following text is meant to be JSON but contains syntax errors. Without changing \
         its schema, keys or values, output only the corrected JSON as a single top-level \
         object. No comments, explanations, ellipses or trailing commas.\n\nOriginal:\n{broken}"
    )
}
