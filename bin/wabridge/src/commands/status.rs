use std::time::Duration;

use wabridge_core::{Config, Paths};

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("wabridge status");
    println!("===============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:       {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found, using defaults)" }
    );

    let config = Config::load_or_default(&paths)?;
    let capabilities_path = config.capabilities_path(&paths);
    println!(
        "Capabilities: {} {}",
        capabilities_path.display(),
        if capabilities_path.exists() { "✓" } else { "✗ (minimal allow-list)" }
    );
    println!("Driver:       {}", config.driver.url);
    println!("Listen:       {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "API token:    {}",
        if config.api_token().is_some() { "✓ configured" } else { "✗ none" }
    );
    println!(
        "Callback:     {}",
        config.forwarder.callback_url.as_deref().unwrap_or("(none)")
    );
    if config.capabilities.allow_all {
        println!("Allow all:    ✓ (capability gate disabled)");
    }
    println!();

    // The bridge binds 0.0.0.0 by default; probe it on loopback.
    let host = match config.gateway.host.as_str() {
        "0.0.0.0" | "" => "127.0.0.1",
        other => other,
    };
    let url = format!("http://{}:{}/health", host, config.gateway.port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            println!(
                "Bridge:       ✓ running (session {})",
                body.get("state").and_then(|s| s.as_str()).unwrap_or("unknown")
            );
        }
        Ok(resp) => println!("Bridge:       ✗ health check returned {}", resp.status()),
        Err(_) => println!("Bridge:       ✗ not running ({})", url),
    }

    Ok(())
}
