#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before any configuration is read from the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    certplane::cli::run_cli().await
}
