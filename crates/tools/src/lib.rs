//! Built-in tool implementations for Toolwright.
//!
//! Tools give the agent access to outside data: crypto prices and market
//! rankings, weather forecasts, PDF documents, web search, plus a few
//! local utilities (arithmetic, random numbers, the clock).

pub mod coingecko;
pub mod http;
pub mod pdf;
pub mod search;
pub mod utility;
pub mod weather;

use std::sync::Arc;

use toolwright_config::ToolsConfig;
use toolwright_core::error::ToolError;
use toolwright_core::tool::ToolRegistry;
use tracing::debug;

pub use coingecko::{CoinGeckoMarketTool, CoinGeckoPriceTool};
pub use pdf::PdfReaderTool;
pub use search::BraveSearchTool;
pub use utility::{AdditionTool, CurrentTimeTool, RandomNumberTool};
pub use weather::WeatherTool;

/// Build the registry with every built-in tool.
///
/// Web search is only registered when a Brave API key is configured.
/// The weather tool is always offered and reports a missing key when called.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let client = http::client();
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(WeatherTool::new(
        client.clone(),
        &config.openweathermap_url,
        config.openweathermap_api_key.clone(),
    )))?;
    registry.register(Arc::new(CoinGeckoPriceTool::new(
        client.clone(),
        &config.coingecko_url,
        config.coingecko_api_key.clone(),
    )))?;
    registry.register(Arc::new(CoinGeckoMarketTool::new(
        client.clone(),
        &config.coingecko_url,
        config.coingecko_api_key.clone(),
    )))?;
    registry.register(Arc::new(PdfReaderTool::new(client.clone())))?;

    match config.brave_search_api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => registry.register(Arc::new(BraveSearchTool::new(
            client,
            &config.brave_search_url,
            key,
        )))?,
        None => debug!("No Brave Search key configured; web search disabled"),
    }

    registry.register(Arc::new(AdditionTool))?;
    registry.register(Arc::new(RandomNumberTool))?;
    registry.register(Arc::new(CurrentTimeTool))?;
    Ok(registry)
}
