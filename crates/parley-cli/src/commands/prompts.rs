//! Prompts-related command implementations

use anyhow::Result;
use parley_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};

/// List all available prompts and their override status
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();

    println!("Available Prompts:\n");
    println!(
        "{:<25} {:>7}  {:<22}  {}",
        "ID", "VERSION", "TASK TYPE", "OVERRIDE"
    );
    println!("{}", "-".repeat(70));

    for id in PromptId::all() {
        let prompt = library.get(*id)?;
        let override_status = if prompt.is_override {
            "✓ Custom"
        } else {
            "Default"
        };
        println!(
            "{:<25} {:>7}  {:<22}  {}",
            id.as_str(),
            prompt.metadata.version,
            prompt.metadata.task_type,
            override_status
        );
    }

    println!();
    cmd_prompts_path()
}

/// Show the content of a specific prompt
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let id = parse_prompt_id(prompt_id)?;
    let mut library = PromptLibrary::new();
    let prompt = library.get(id)?;

    match &prompt.override_path {
        Some(path) => println!("# Source: {}\n", path.display()),
        None => println!("# Source: embedded default\n"),
    }
    println!("{}", prompt.content);
    Ok(())
}

/// Show the prompt override directory
pub fn cmd_prompts_path() -> Result<()> {
    println!(
        "Override directory: {}",
        default_prompts_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not available)".to_string())
    );
    Ok(())
}

pub fn parse_prompt_id(prompt_id: &str) -> Result<PromptId> {
    PromptId::all()
        .iter()
        .copied()
        .find(|id| id.as_str() == prompt_id)
        .ok_or_else(|| {
            let known: Vec<&str> = PromptId::all().iter().map(|id| id.as_str()).collect();
            anyhow::anyhow!("Unknown prompt: {} (known: {})", prompt_id, known.join(", "))
        })
}
