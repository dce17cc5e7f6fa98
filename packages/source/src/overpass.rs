//! Overpass API fetcher for community-mapped treatment plants.
//!
//! Queries every way tagged `man_made=wastewater_plant` inside a state's
//! administrative area (`admin_level=4`) together with its nodes, so the
//! response can be fed straight into [`crate::community::adapt_overpass`].

use crate::SourceError;
use crate::community::OverpassResponse;
use crate::retry;

/// Public Overpass interpreter endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Builds the Overpass QL query for one state, by its full name.
#[must_use]
pub fn build_query(state_name: &str) -> String {
    let escaped = state_name.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "[out:json];\n\
         area[admin_level=4][\"name\"=\"{escaped}\"]->.searchArea;\n\
         (way[\"man_made\"=\"wastewater_plant\"](area.searchArea););\n\
         (._;>;);\n\
         out body;"
    )
}

/// Fetches the wastewater plant ways of one state from Overpass.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after retries or the
/// response is not a valid Overpass JSON document.
pub async fn fetch_wastewater_plants(
    client: &reqwest::Client,
    endpoint: &str,
    state_name: &str,
) -> Result<OverpassResponse, SourceError> {
    let query = build_query(state_name);
    log::info!("Querying Overpass for wastewater plants in {state_name}");

    let body = retry::send_json(
        || client.post(endpoint).form(&[("data", query.as_str())]),
        retry::DEFAULT_MAX_RETRIES,
    )
    .await?;

    let response: OverpassResponse = serde_json::from_value(body)?;
    log::info!(
        "Overpass returned {} elements for {state_name}",
        response.elements.len()
    );
    Ok(response)
}
