//! OpenWeatherMap forecast tool.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use toolwright_core::error::ToolError;
use toolwright_core::schema::{FieldKind, FieldSpec, ToolSchema};
use toolwright_core::tool::{Tool, parse_arguments};
use tracing::debug;

use crate::http;

const UPSTREAM: &str = "OpenWeatherMap";

/// Forecast slots are three hours apart.
const SLOTS_PER_DAY: u32 = 8;
const MAX_SLOTS: u32 = 40;

pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherTool {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: http::trim_base(base_url),
            api_key,
        }
    }

    /// Keys pasted from a `.env` file often carry stray quotes.
    fn clean_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(|k| k.replace(['"', '\'', ';'], "").trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Deserialize)]
struct WeatherArgs {
    city: String,
    country: Option<String>,
    days: Option<f64>,
}

#[derive(Deserialize)]
struct Forecast {
    #[serde(default)]
    list: Vec<ForecastSlot>,
    city: Option<City>,
}

#[derive(Deserialize)]
struct ForecastSlot {
    dt_txt: String,
    main: Readings,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Deserialize)]
struct Readings {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
}

#[derive(Deserialize)]
struct Condition {
    description: String,
}

#[derive(Deserialize)]
struct City {
    name: String,
    country: String,
}

struct DaySummary {
    temps: Vec<f64>,
    descriptions: Vec<String>,
    min: f64,
    max: f64,
}

/// Round half up, so `-2.5` becomes `-2` as people expect on a thermometer.
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "openWeatherMap"
    }

    fn description(&self) -> &str {
        "Retrieves weather forecasts for a given city with temperature ranges and conditions."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::required(
                "city",
                FieldKind::String,
                "The name of the city to get the weather for.",
            ),
            FieldSpec::optional(
                "country",
                FieldKind::String,
                "The country code of the city (optional).",
            ),
            FieldSpec::optional(
                "days",
                FieldKind::Integer,
                "Number of days for the forecast (1-5 days, default is 3).",
            )
            .range(1.0, 5.0),
        ])
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: WeatherArgs = parse_arguments(self.name(), arguments)?;
        let api_key = self.clean_key().ok_or_else(|| ToolError::NotConfigured {
            tool_name: self.name().to_string(),
            reason: "OPENWEATHERMAP_API_KEY is not set".into(),
        })?;

        let location = match &args.country {
            Some(country) => format!("{},{country}", args.city),
            None => args.city.clone(),
        };
        let days = args.days.map(|d| d as u32).unwrap_or(3).clamp(1, 5);
        let slots = (days * SLOTS_PER_DAY).min(MAX_SLOTS);

        let response = self
            .client
            .get(format!("{}/forecast", self.base_url))
            .query(&[
                ("q", location.clone()),
                ("appid", api_key),
                ("units", "metric".into()),
                ("cnt", slots.to_string()),
            ])
            .send()
            .await
            .map_err(|e| http::transport_error(self.name(), UPSTREAM, e))?;

        match response.status() {
            s if s.is_success() => {}
            reqwest::StatusCode::NOT_FOUND => {
                let place = match &args.country {
                    Some(country) => format!("{}, {country}", args.city),
                    None => args.city.clone(),
                };
                return Err(ToolError::failed(
                    self.name(),
                    format!(
                        "couldn't find weather data for {place}. Please check the city name and try again."
                    ),
                ));
            }
            reqwest::StatusCode::UNAUTHORIZED => {
                return Err(ToolError::failed(
                    self.name(),
                    "API key error. Please check your OpenWeatherMap API key.",
                ));
            }
            s => {
                return Err(ToolError::failed(
                    self.name(),
                    format!("OpenWeatherMap API error! status: {}", s.as_u16()),
                ));
            }
        }

        let forecast: Forecast = response
            .json()
            .await
            .map_err(|e| http::decode_error(self.name(), UPSTREAM, e))?;
        debug!(slots = forecast.list.len(), "Forecast received");

        if forecast.list.is_empty() {
            return Ok(format!("❌ No weather data available for {}.", args.city));
        }

        let location_name = forecast
            .city
            .as_ref()
            .map(|c| format!("{}, {}", c.name, c.country))
            .unwrap_or(location);
        Ok(render_forecast(&location_name, days, &forecast.list))
    }
}

fn render_forecast(location: &str, days: u32, slots: &[ForecastSlot]) -> String {
    // ISO dates sort chronologically as strings
    let mut by_day: BTreeMap<&str, DaySummary> = BTreeMap::new();
    for slot in slots {
        let date = slot.dt_txt.split(' ').next().unwrap_or(&slot.dt_txt);
        let day = by_day.entry(date).or_insert_with(|| DaySummary {
            temps: Vec::new(),
            descriptions: Vec::new(),
            min: slot.main.temp_min,
            max: slot.main.temp_max,
        });
        day.temps.push(slot.main.temp);
        if let Some(condition) = slot.weather.first() {
            day.descriptions.push(condition.description.clone());
        }
        day.min = day.min.min(slot.main.temp_min);
        day.max = day.max.max(slot.main.temp_max);
    }

    let lines: Vec<String> = by_day
        .iter()
        .take(days as usize)
        .map(|(date, day)| {
            let avg = day.temps.iter().sum::<f64>() / day.temps.len() as f64;
            let desc = day
                .descriptions
                .first()
                .map(String::as_str)
                .unwrap_or("No description");
            format!(
                "📅 {date}: 🌡️ {}°C ({}°C-{}°C), 🌥️ {desc}",
                round_half_up(avg),
                round_half_up(day.min),
                round_half_up(day.max),
            )
        })
        .collect();

    format!(
        "🌤️ Weather forecast for {location} (next {days} days):\n{}",
        lines.join("\n")
    )
}
