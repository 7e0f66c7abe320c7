//! PM33 Connect CLI
//!
//! Run with: cargo run --bin pm33 -- <command>

#[tokio::main]
async fn main() {
    // Client ids and secrets are commonly kept in .env
    let _ = dotenvy::dotenv();

    if let Err(e) = pm33_connect::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
