//! Place candidates offered to the model
//!
//! Searching and ranking real places is delegated to a [`PlaceProvider`]; this
//! module owns the query shape and the candidates document embedded in the
//! itinerary prompt.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::errors::AppError;

pub const MAX_RESTAURANTS: usize = 5;
pub const MAX_ATTRACTIONS: usize = 4;
pub const MAX_CAFES: usize = 3;

const DEFAULT_RATING: f64 = 4.0;
const DEFAULT_PRICE_LEVEL: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub rating: Option<f64>,
    pub user_ratings: Option<u32>,
    pub price_level: Option<u8>,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub distance_meters: f64,
}

/// Search parameters handed to a [`PlaceProvider`]. Providers backed by a
/// real search service restrict results to `include_types` and drop places
/// below `min_rating` or with fewer than `min_user_ratings` reviews.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceQuery {
    pub destination: String,
    pub radius_meters: u32,
    pub include_types: Vec<String>,
    pub min_rating: f64,
    pub min_user_ratings: u32,
}

impl PlaceQuery {
    pub fn new(destination: &str, intensity: &str) -> Self {
        Self {
            destination: destination.to_string(),
            radius_meters: radius_for_intensity(intensity),
            include_types: ["restaurant", "tourist_attraction", "cafe", "museum"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_rating: 4.0,
            min_user_ratings: 200,
        }
    }
}

/// Search radius around the destination centre. Busier itineraries reach further.
pub fn radius_for_intensity(intensity: &str) -> u32 {
    match intensity {
        "low" => 1_500,
        "high" => 3_000,
        _ => 2_000,
    }
}

#[async_trait]
pub trait PlaceProvider: Send + Sync {
    async fn search(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>, AppError>;
}

/// Static candidates used when no place-search backend is configured or the
/// configured one fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplePlaceProvider;

#[async_trait]
impl PlaceProvider for SamplePlaceProvider {
    async fn search(&self, _query: &PlaceQuery) -> Result<Vec<PlaceCandidate>, AppError> {
        Ok(sample_candidates())
    }
}

pub fn sample_candidates() -> Vec<PlaceCandidate> {
    let sample = |id: &str, name: &str, kind: &str, rating: f64, user_ratings: u32| PlaceCandidate {
        id: id.to_string(),
        name: name.to_string(),
        kind: kind.to_string(),
        rating: Some(rating),
        user_ratings: Some(user_ratings),
        price_level: Some(2),
        lat: 37.5665,
        lng: 126.9780,
        address: String::new(),
        distance_meters: 0.0,
    };
    vec![
        sample("sample1", "Sample Restaurant", "restaurant", 4.2, 500),
        sample("sample2", "Sample Cafe", "cafe", 4.0, 300),
    ]
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CandidateEntry<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    rating: f64,
    user_ratings: u32,
    price_level: u8,
    lat: f64,
    lng: f64,
    address: &'a str,
    distance: i64,
}

impl<'a> From<&'a PlaceCandidate> for CandidateEntry<'a> {
    fn from(place: &'a PlaceCandidate) -> Self {
        Self {
            id: &place.id,
            name: &place.name,
            kind: &place.kind,
            rating: place.rating.unwrap_or(DEFAULT_RATING),
            user_ratings: place.user_ratings.unwrap_or(0),
            price_level: place.price_level.unwrap_or(DEFAULT_PRICE_LEVEL),
            lat: place.lat,
            lng: place.lng,
            address: &place.address,
            distance: place.distance_meters as i64,
        }
    }
}

/// Groups candidates by type in provider order: restaurants, then attractions,
/// then cafes, each group capped. Other types are left out.
pub fn build_candidates_json(destination: &str, places: &[PlaceCandidate]) -> String {
    let of_kind = |kind: &'static str, limit: usize| {
        places
            .iter()
            .filter(move |place| place.kind == kind)
            .take(limit)
            .map(CandidateEntry::from)
    };
    let candidates: Vec<CandidateEntry<'_>> = of_kind("restaurant", MAX_RESTAURANTS)
        .chain(of_kind("tourist_attraction", MAX_ATTRACTIONS))
        .chain(of_kind("cafe", MAX_CAFES))
        .collect();

    json!({
        "destination": destination,
        "totalCount": candidates.len(),
        "candidates": candidates,
    })
    .to_string()
}
