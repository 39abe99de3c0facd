//! `toolwright tools`: List the registered tools and their schemas.

use toolwright_core::tool::ToolRegistry;

use super::{build_registry, load_config};

pub async fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let registry = build_registry(&config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
    } else {
        print!("{}", describe(&registry));
    }
    Ok(())
}

/// One entry per tool: name, description, then its argument schema.
pub fn describe(registry: &ToolRegistry) -> String {
    let mut out = String::new();
    for definition in registry.definitions() {
        out.push_str(&format!("{}\n  {}\n", definition.name, definition.description));
        let schema = serde_json::to_string_pretty(&definition.parameters).unwrap_or_default();
        for line in schema.lines() {
            out.push_str(&format!("    {line}\n"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolwright_config::ToolsConfig;

    #[test]
    fn lists_default_tools_with_schemas() {
        let registry = toolwright_tools::default_registry(&ToolsConfig::default()).unwrap();
        let text = describe(&registry);
        assert!(text.contains("additionTool\n"));
        assert!(text.contains("\"coinIds\""));
        assert!(!text.contains("braveSearch"));
    }
}
