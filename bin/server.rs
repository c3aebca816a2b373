// Sound Healing API - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use sound_healing::{connect, router, AppState, Config, VERSION};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🌐 Sound Healing API v{} - Web Server", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env();

    // Missing or broken database config degrades, never aborts
    let gateway = connect(&config);
    if gateway.is_configured() {
        println!("✓ Database ready: {}", gateway.database_name().unwrap_or("-"));
    } else {
        println!("⚠️  No database, session and journal endpoints will return 500");
    }

    let addr = config.bind_addr();
    let app = router(AppState::new(gateway, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/tracks", addr);
    println!("\n   Press Ctrl+C to stop\n");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .await
        .context("Server stopped with an error")?;

    Ok(())
}
