//! Basic usage example - open a vault directory and list what it holds

use model_vault::{Principal, Registry, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Get path from args or use current directory
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./example-vault".to_string());

    println!("Opening vault at: {}", path);

    // No database: everything comes from the directory tree
    let registry = Registry::builder(&path)
        .auto_create_dirs(true)
        .build()
        .await?;

    let models = registry.list_models(None, None);
    if models.is_empty() {
        println!("No models found in vault.");
    } else {
        println!("Found {} models:", models.len());
        for model in &models {
            println!("  - [{}] {} ({} bytes)", model.id, model.name, model.file_size);
        }
    }

    let operator = Principal::Admin {
        user_id: 0,
        email: "operator@localhost".to_string(),
    };
    match registry.list_archives(&operator) {
        Ok(archives) => {
            for archive in archives {
                println!("Archive {} holds {} models", archive.name, archive.count);
            }
        }
        Err(e) => println!("Cannot list archives: {}", e),
    }

    Ok(())
}
