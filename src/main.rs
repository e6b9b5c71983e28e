use anyhow::Context;
use chatmate::setup::{self, NativeDeps};
use chatmate::Settings;
use dotenv::dotenv;
use std::io;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    println!("ChatMate Setup Assistant\n");

    match Settings::new() {
        Ok(settings) => {
            let missing = settings.missing_credentials();
            if missing.is_empty() {
                println!("All credentials are already set. Answers below replace them.\n");
            } else {
                println!("Missing: {}\n", missing.join(", "));
            }
        }
        Err(e) => warn!("Could not read current configuration: {}", e),
    }

    let stdin = io::stdin();
    let answers = setup::collect_answers(&mut stdin.lock(), &mut io::stdout())
        .context("failed to read credentials")?;

    let env_path = Path::new(".env");
    setup::write_env(env_path, &answers)
        .with_context(|| format!("failed to write {}", env_path.display()))?;
    info!("Wrote {} keys to {}", answers.len(), env_path.display());
    println!("\nConfiguration updated successfully!");

    let on_macos = cfg!(target_os = "macos");
    if on_macos {
        println!("\nInstalling iOS dependencies...");
    }
    let deps = setup::install_native_deps(Path::new("ios"));
    println!("{}", deps.message());
    if deps == NativeDeps::InstallFailed {
        info!("Native dependency install needs a manual retry");
    }

    println!("\nNext steps:");
    for (i, step) in setup::next_steps(on_macos).iter().enumerate() {
        println!("{}. {}", i + 1, step);
    }

    Ok(())
}
