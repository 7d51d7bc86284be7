//! Example: Dim a light channel up and back down.
//!
//! Usage: light <uid>   (e.g. `light 3::AO::5` after the brick has been seen)

use std::time::Duration;

use webbrick_lan_bridge::{DriverConfig, WebbrickDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let uid = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: light <uid>"))?;

    let mut driver = WebbrickDriver::start(DriverConfig::builder().build()).await?;

    // Wait for the brick owning this channel to announce itself
    println!("Waiting for {uid} to be discovered...");
    loop {
        if driver.device(&uid).await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    for percent in [25u32, 50, 75, 100] {
        println!("Setting {uid} to {percent}%");
        match driver.set_level(&uid, percent as f64 / 100.0).await {
            Ok(()) => {}
            Err(e) => println!("Error setting level: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    println!("Switching {uid} off");
    if let Err(e) = driver.set_state(&uid, false).await {
        println!("Error switching off: {e}");
    }

    driver.shutdown().await;
    Ok(())
}
