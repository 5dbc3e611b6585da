//! `lokal tools` — List the tools the agent can call.

use super::{CliResult, load_config};

pub async fn run() -> CliResult {
    let config = load_config()?;
    let registry = lokal_tools::default_registry(&config.tools);

    println!("  {} tools registered\n", registry.len());
    for def in registry.definitions() {
        println!("  • {}", def.name);
        println!("    {}", def.description);
    }

    println!();
    println!("  Allowed per mode:");
    for (name, mode) in &config.modes {
        let tools = if config.is_tool_enabled(name) && !mode.allowed_tools.is_empty() {
            mode.allowed_tools.join(", ")
        } else {
            "(none)".to_string()
        };
        println!("    {name:<10} {tools}");
    }
    Ok(())
}
