//! CoinGecko tools: spot prices and market-cap rankings.
//!
//! Uses the public v3 API. A demo key is sent when configured; the free
//! tier works without one.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use toolwright_core::error::ToolError;
use toolwright_core::schema::{FieldKind, FieldSpec, ToolSchema};
use toolwright_core::tool::{Tool, parse_arguments};
use tracing::debug;

use crate::http;

const UPSTREAM: &str = "CoinGecko";

/// Shorten large amounts: `1.23T`, `456.00B`, `7.89M`, `1.50K`.
pub(crate) fn format_amount(n: f64) -> String {
    if n >= 1e12 {
        format!("{:.2}T", n / 1e12)
    } else if n >= 1e9 {
        format!("{:.2}B", n / 1e9)
    } else if n >= 1e6 {
        format!("{:.2}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.2}K", n / 1e3)
    } else {
        format!("{n:.2}")
    }
}

/// Prices get more decimals the smaller they are.
pub(crate) fn format_price(price: f64) -> String {
    if price >= 1.0 {
        group_thousands(&format!("{price:.2}"))
    } else if price >= 0.01 {
        format!("{price:.4}")
    } else if price >= 0.0001 {
        format!("{price:.6}")
    } else {
        format!("{price:.8}")
    }
}

fn group_thousands(fixed: &str) -> String {
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed, ""));
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    if frac_part.is_empty() {
        grouped
    } else {
        format!("{grouped}.{frac_part}")
    }
}

fn change_line(label: &str, change: f64) -> String {
    let emoji = if change >= 0.0 { "📈" } else { "📉" };
    format!("   {emoji} {label}: {change:+.2}%\n")
}

fn with_key(builder: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
    let builder = builder.header("Accept", "application/json");
    match api_key {
        Some(key) => builder.header("x-cg-demo-api-key", key),
        None => builder,
    }
}

pub struct CoinGeckoPriceTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoPriceTool {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: http::trim_base(base_url),
            api_key,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceArgs {
    coin_ids: String,
    vs_currencies: Option<String>,
    include_market_cap: Option<bool>,
    include_volume: Option<bool>,
    include_price_change: Option<bool>,
}

#[async_trait]
impl Tool for CoinGeckoPriceTool {
    fn name(&self) -> &str {
        "coinGeckoPrice"
    }

    fn description(&self) -> &str {
        "Get current cryptocurrency prices from CoinGecko. Use coin IDs like 'bitcoin', 'ethereum', 'solana', etc."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::required(
                "coinIds",
                FieldKind::String,
                "Comma-separated list of coin IDs (e.g., 'bitcoin,ethereum,solana')",
            ),
            FieldSpec::optional(
                "vsCurrencies",
                FieldKind::String,
                "Comma-separated list of currencies (default: 'usd')",
            ),
            FieldSpec::optional(
                "includeMarketCap",
                FieldKind::Boolean,
                "Include market cap data (default: true)",
            ),
            FieldSpec::optional(
                "includeVolume",
                FieldKind::Boolean,
                "Include 24h volume data (default: true)",
            ),
            FieldSpec::optional(
                "includePriceChange",
                FieldKind::Boolean,
                "Include 24h price change data (default: true)",
            ),
        ])
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: PriceArgs = parse_arguments(self.name(), arguments)?;
        let currencies = args.vs_currencies.unwrap_or_else(|| "usd".into());
        let flag = |b: Option<bool>| b.unwrap_or(true).to_string();

        let url = format!("{}/simple/price", self.base_url);
        let request = self.client.get(&url).query(&[
            ("ids", args.coin_ids.clone()),
            ("vs_currencies", currencies),
            ("include_market_cap", flag(args.include_market_cap)),
            ("include_24hr_vol", flag(args.include_volume)),
            ("include_24hr_change", flag(args.include_price_change)),
            ("include_last_updated_at", "true".into()),
        ]);

        let response = with_key(request, self.api_key.as_deref())
            .send()
            .await
            .map_err(|e| http::transport_error(self.name(), UPSTREAM, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(format!(
                "❌ Sorry, I couldn't find price data for \"{}\". Please check the coin ID and try again.\n\n\
                 💡 Common coin IDs: bitcoin, ethereum, solana, cardano, polkadot, chainlink, avalanche-2, polygon, etc.",
                args.coin_ids
            ));
        }
        if !status.is_success() {
            return Err(ToolError::failed(
                self.name(),
                format!("CoinGecko API error! status: {}", status.as_u16()),
            ));
        }

        let data: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| http::decode_error(self.name(), UPSTREAM, e))?;
        debug!(coins = data.len(), "CoinGecko prices received");

        Ok(render_prices(&data))
    }
}

fn render_prices(data: &Map<String, Value>) -> String {
    let mut out = String::from("💰 **Cryptocurrency Prices**\n\n");

    for (coin_id, fields) in data {
        let Some(fields) = fields.as_object() else {
            continue;
        };
        out.push_str(&format!(
            "🪙 **{}**\n",
            coin_id.replace('-', " ").to_uppercase()
        ));

        for (key, value) in fields {
            if let (false, Some(price)) = (key.contains('_'), value.as_f64()) {
                out.push_str(&format!(
                    "   💵 Price ({}): {}\n",
                    key.to_uppercase(),
                    format_price(price)
                ));
            }
        }

        let first_nonzero = |needle: &str| {
            fields
                .iter()
                .find(|(k, _)| k.contains(needle))
                .and_then(|(_, v)| v.as_f64())
                .filter(|v| *v != 0.0)
        };
        if let Some(cap) = first_nonzero("market_cap") {
            out.push_str(&format!("   📊 Market Cap: {}\n", format_amount(cap)));
        }
        if let Some(vol) = first_nonzero("24h_vol") {
            out.push_str(&format!("   📈 24h Volume: {}\n", format_amount(vol)));
        }
        if let Some(change) = first_nonzero("24h_change") {
            out.push_str(&change_line("24h Change", change));
        }
        out.push('\n');
    }
    out
}

pub struct CoinGeckoMarketTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoMarketTool {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: http::trim_base(base_url),
            api_key,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketArgs {
    vs_currency: Option<String>,
    per_page: Option<f64>,
    page: Option<f64>,
    category: Option<String>,
}

#[derive(Deserialize)]
struct MarketCoin {
    name: String,
    symbol: String,
    market_cap_rank: Option<u32>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    circulating_supply: Option<f64>,
}

#[async_trait]
impl Tool for CoinGeckoMarketTool {
    fn name(&self) -> &str {
        "coinGeckoMarket"
    }

    fn description(&self) -> &str {
        "Get market data for top crypto-currencies by market cap from CoinGecko"
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::optional(
                "vsCurrency",
                FieldKind::String,
                "The target currency (default: 'usd')",
            ),
            FieldSpec::optional(
                "perPage",
                FieldKind::Integer,
                "Number of results per page (max 250, default: 10)",
            )
            .range(1.0, 250.0),
            FieldSpec::optional("page", FieldKind::Integer, "Page number (default: 1)").min(1.0),
            FieldSpec::optional(
                "category",
                FieldKind::String,
                "Filter by category (e.g., 'decentralized-finance-defi', 'gaming')",
            ),
        ])
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: MarketArgs = parse_arguments(self.name(), arguments)?;
        let currency = args.vs_currency.unwrap_or_else(|| "usd".into());
        let limit = args.per_page.map(|n| n as u32).unwrap_or(10).clamp(1, 250);
        let page = args.page.map(|n| n as u32).unwrap_or(1).max(1);

        let mut params = vec![
            ("vs_currency", currency.clone()),
            ("order", "market_cap_desc".into()),
            ("per_page", limit.to_string()),
            ("page", page.to_string()),
            ("sparkline", "false".into()),
            ("locale", "en".into()),
        ];
        if let Some(category) = &args.category {
            params.push(("category", category.clone()));
        }

        let url = format!("{}/coins/markets", self.base_url);
        let response = with_key(self.client.get(&url).query(&params), self.api_key.as_deref())
            .send()
            .await
            .map_err(|e| http::transport_error(self.name(), UPSTREAM, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(
                self.name(),
                format!("CoinGecko API error! status: {}", status.as_u16()),
            ));
        }

        let coins: Vec<MarketCoin> = response
            .json()
            .await
            .map_err(|e| http::decode_error(self.name(), UPSTREAM, e))?;

        let mut out = format!("📊 **Top {limit} Cryptocurrencies by Market Cap**\n");
        if let Some(category) = &args.category {
            out.push_str(&format!("🏷️ Category: {category}\n"));
        }
        out.push_str(&format!("💱 Currency: {}\n\n", currency.to_uppercase()));

        for coin in &coins {
            let symbol = coin.symbol.to_uppercase();
            let rank = coin
                .market_cap_rank
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".into());
            out.push_str(&format!("**{rank}. {} ({symbol})**\n", coin.name));
            out.push_str(&format!(
                "   💰 ${}\n",
                format_price(coin.current_price.unwrap_or_default())
            ));
            out.push_str(&format!(
                "   📊 Market Cap: ${}\n",
                format_amount(coin.market_cap.unwrap_or_default())
            ));
            out.push_str(&format!(
                "   📈 24h Volume: ${}\n",
                format_amount(coin.total_volume.unwrap_or_default())
            ));
            out.push_str(&change_line(
                "24h",
                coin.price_change_percentage_24h.unwrap_or_default(),
            ));
            if let Some(supply) = coin.circulating_supply.filter(|s| *s != 0.0) {
                out.push_str(&format!(
                    "   🔄 Circulating: {} {symbol}\n",
                    format_amount(supply)
                ));
            }
            out.push('\n');
        }
        Ok(out)
    }
}
