use std::io::{self, Write};
use std::path::Path;

use wabridge_actions::CapabilityGate;
use wabridge_core::{Config, Paths};

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();

    if paths.config_file().exists() && !force {
        print!("Config already exists. Overwrite? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    paths.ensure_dirs()?;

    Config::default().save(&paths.config_file())?;
    println!("✓ Created config: {}", paths.config_file().display());

    write_if_not_exists(&paths.capabilities_file(), &CapabilityGate::minimal_descriptor())?;

    println!();
    println!("Next steps:");
    println!("  1. Start the automation driver (default ws://127.0.0.1:3001)");
    println!("  2. Edit {} to widen the allowed methods", paths.capabilities_file().display());
    println!("  3. Run `wabridge serve` and scan the QR code");

    Ok(())
}

fn write_if_not_exists(path: &Path, content: &str) -> io::Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        println!("✓ Created capabilities: {}", path.display());
    }
    Ok(())
}
