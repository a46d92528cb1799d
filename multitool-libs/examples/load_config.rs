// Example: Load the service config and print what the engine will use
use multitool_libs::{load_service_config, NodeKind};

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "multitool-hermes/config.yaml".to_string());

    match load_service_config(&config_path) {
        Ok(config) => {
            println!("✓ Loaded {}", config_path);
            println!("  Port: {}", config.port);
            println!("  Nexus dir: {}", config.nexus_dir.display());
            println!("  Revert delay: {:?}", config.executor.revert_delay());
            println!("  Root mode: {:?}", config.executor.root_mode);
            match &config.chat {
                Some(chat) => println!("  Chat: {} ({})", chat.model, chat.base_url),
                None => println!("  Chat: not configured"),
            }

            println!("\n  Node kinds:");
            for spec in NodeKind::catalog() {
                println!("    - {} ({:?}, {} fields)", spec.label, spec.role, spec.fields.len());
            }
        }
        Err(e) => {
            eprintln!("✗ Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}
