//! `toolwright gateway`: Start the HTTP API server.

use std::sync::Arc;

use super::{build_agent, load_config};

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let agent = Arc::new(build_agent(&config, None).await?);

    println!("Toolwright Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} ({})", config.model, config.provider);
    println!("   Store:     {}", agent.store().backend_name());
    println!("   Approval:  {}", if agent.requires_approval() { "required" } else { "off" });

    toolwright_gateway::start(&config.gateway, agent).await?;

    Ok(())
}
