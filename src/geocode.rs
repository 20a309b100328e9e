// Geo Resolver (C7): GPS normalization and reverse geocoding with bounded
// retries. GeocodeError is recovered locally by callers — total failure
// yields all-null location fields, never an aborted pipeline.

use std::time::Duration;

use serde::Deserialize;

use crate::constants::{GEOCODE_RETRIES, GEOCODE_RETRY_DELAY_SECONDS, GEOCODE_TIMEOUT_SECONDS};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoLocation {
    pub class: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    class: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

/// Reverse geocodes `(lat, lon)` with up to `GEOCODE_RETRIES` attempts, a
/// `GEOCODE_RETRY_DELAY_SECONDS` fixed delay between attempts (never after
/// the last), and a `GEOCODE_TIMEOUT_SECONDS` per-attempt timeout. Returns
/// `None` on total failure rather than propagating an error.
pub fn reverse_geocode(lat: f64, lon: f64, user_agent: &str, base_url: &str) -> Option<GeoLocation> {
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(GEOCODE_TIMEOUT_SECONDS))
        .build();

    let mut last_error = None;
    for attempt in 0..GEOCODE_RETRIES {
        let result = agent
            .get(base_url)
            .query("lat", &lat.to_string())
            .query("lon", &lon.to_string())
            .query("format", "jsonv2")
            .set("User-Agent", user_agent)
            .call();

        match result {
            Ok(response) => match response.into_json::<NominatimResponse>() {
                Ok(parsed) => return Some(parse_location(parsed)),
                Err(e) => last_error = Some(e.to_string()),
            },
            Err(e) => last_error = Some(e.to_string()),
        }

        if attempt + 1 < GEOCODE_RETRIES {
            log::warn!(
                "reverse geocode attempt {}/{} failed, retrying in {}s: {:?}",
                attempt + 1,
                GEOCODE_RETRIES,
                GEOCODE_RETRY_DELAY_SECONDS,
                last_error
            );
            std::thread::sleep(Duration::from_secs(GEOCODE_RETRY_DELAY_SECONDS));
        }
    }

    log::error!("reverse geocoding failed after {GEOCODE_RETRIES} attempts: {last_error:?}");
    None
}

fn parse_location(response: NominatimResponse) -> GeoLocation {
    GeoLocation {
        class: response.class,
        kind: response.kind,
        name: response.name,
        display_name: response.display_name,
        city: response
            .address
            .city
            .or(response.address.town)
            .or(response.address.village),
        province: response.address.state,
        country: response.address.country,
    }
}
