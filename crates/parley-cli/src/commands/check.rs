//! Backend health and routing command

use anyhow::Result;
use parley_core::{config::default_config_path, LlmBackend, LlmClient};

/// Test the configured LLM backend and show model routing
pub async fn cmd_check() -> Result<()> {
    println!("🔍 Checking LLM backend...\n");

    println!(
        "  Pipeline config: {}",
        default_config_path()
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(embedded defaults)".to_string())
    );

    let Some(client) = LlmClient::from_env() else {
        println!("  ⚠️  No backend configured. Extraction uses local strategies only.");
        println!("\nTo enable the model fallback:");
        println!("  export OLLAMA_HOST=http://localhost:11434");
        println!("  or AI_BACKEND=openai_compatible with OPENAI_COMPATIBLE_HOST");
        return Ok(());
    };

    println!("  Host: {}", client.host());
    println!("  Model: {}\n", client.model());

    print!("Checking availability... ");
    if client.health_check().await {
        println!("✅ Connected");
    } else {
        println!("❌ Failed");
        println!("\n⚠️  Could not reach {}", client.host());
        return Ok(());
    }

    let info = client.router_info();
    println!("\n🔀 Model routing:");
    println!("  Default: {}", info.default_model);
    if let Some(fallback) = &info.fallback_model {
        println!("  Fallback: {}", fallback);
    }
    for (task, model) in &info.task_models {
        println!("  {}: {}", task, model);
    }

    Ok(())
}
