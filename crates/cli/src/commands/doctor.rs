//! `lokal doctor` — Diagnose system health.

use lokal_config::AppConfig;

use super::{CliResult, open_store};

pub async fn run() -> CliResult {
    println!("🩺 lokal Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    // Check config
    let config_path = AppConfig::config_path();
    if !config_path.exists() {
        println!("  ⚠️  No config file; using defaults. Run `lokal onboard` to create one");
        issues += 1;
    }
    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config file first: {}", config_path.display());
            return Ok(());
        }
    };

    // Check model backend
    let provider = lokal_providers::build_from_config(&config.model);
    match provider.health_check().await {
        Ok(true) => {
            println!("  ✅ Model backend reachable at {}", config.model.base_url);
            match provider.list_models().await {
                Ok(models) if models.iter().any(|m| m == &config.model.model) => {
                    println!("  ✅ Model '{}' is served", config.model.model);
                }
                Ok(models) if !models.is_empty() => {
                    println!("  ⚠️  Model '{}' not listed; backend serves: {}", config.model.model, models.join(", "));
                    issues += 1;
                }
                Ok(_) => println!("  ✅ Backend does not list models"),
                Err(e) => {
                    println!("  ⚠️  Could not list models: {e}");
                    issues += 1;
                }
            }
        }
        Ok(false) => {
            println!("  ❌ Model backend at {} is not healthy", config.model.base_url);
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Model backend unreachable: {e}");
            issues += 1;
        }
    }

    // Check store
    match open_store(&config).await {
        Ok(store) => match store.list_conversations().await {
            Ok(conversations) => {
                println!("  ✅ {} store ok ({} conversations)", store.name(), conversations.len())
            }
            Err(e) => {
                println!("  ❌ Store query failed: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Store unavailable: {e}");
            issues += 1;
        }
    }

    // Check tools
    if config.tools.workspace_dir.exists() {
        println!("  ✅ Workspace directory exists");
    } else {
        println!("  ⚠️  No workspace directory; run `lokal onboard`");
        issues += 1;
    }

    match tokio::process::Command::new(&config.tools.python_bin).arg("--version").output().await {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            println!("  ✅ {}", version.trim());
        }
        _ => {
            println!("  ⚠️  '{}' not runnable; python_exec will fail", config.tools.python_bin);
            issues += 1;
        }
    }

    if config.tools.search_api_key.is_some() {
        println!("  ✅ Web search key configured");
    } else {
        println!("  ⚠️  WEB_SEARCH_API_KEY not set; web_search will fail");
        issues += 1;
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
