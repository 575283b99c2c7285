use wabridge_actions::{CapabilityGate, Operation, Scope};
use wabridge_core::{Config, Paths};

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let path = config.capabilities_path(&paths);
    let gate = CapabilityGate::load(&path).with_allow_all(config.capabilities.allow_all);

    println!("Capability descriptor: {}", path.display());
    if gate.allow_all() {
        println!("Override active: every method below may be called");
    }
    println!();

    for scope in Scope::ALL {
        println!("{}:", scope);
        for method in Operation::methods(scope) {
            let mark = if gate.is_allowed(scope, method) { "✓" } else { "✗" };
            println!("  {} {}", mark, method);
        }
    }
    Ok(())
}
