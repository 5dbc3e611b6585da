//! `lokal onboard` — First-time setup.

use lokal_config::AppConfig;

use super::CliResult;

pub async fn run() -> CliResult {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    println!("🦀 lokal — First-Time Setup");
    println!("===========================\n");

    // Create directories
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    // Create config file
    let config = if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        AppConfig::load_from(&config_path)?
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        AppConfig::default()
    };

    let artifacts = config.tools.workspace_dir.join("artifacts");
    if !artifacts.exists() {
        std::fs::create_dir_all(&artifacts)?;
        println!("✅ Created workspace directory: {}", config.tools.workspace_dir.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Start a local model server (llama.cpp, Ollama, vLLM, ...)");
    println!("   2. Point [model].base_url in {} at it", config_path.display());
    println!("   3. Run: lokal doctor");
    println!("   4. Run: lokal chat --mode agent\n");

    Ok(())
}
