//! Example: Discover bricks and print every registry event.

use webbrick_lan_bridge::{DeviceCategory, DriverConfig, WebbrickDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = DriverConfig::builder().build();
    let mut driver = WebbrickDriver::start(config).await?;
    let mut events = driver.take_events().expect("events taken once");

    println!("Listening for brick announcements (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        let device = &event.device;
                        match device.category {
                            DeviceCategory::Light => println!(
                                "{}: {} level={} ({})",
                                event.name, device.uid, device.level, device.last_message
                            ),
                            DeviceCategory::Temp => println!(
                                "{}: {} temp={:.1}",
                                event.name, device.uid, device.level
                            ),
                            _ => println!("{}: {} ({})", event.name, device.uid, device.last_message),
                        }
                    }
                    None => {
                        println!("Event queue closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
        }
    }

    println!("\nKnown devices:");
    for device in driver.devices().await {
        println!(
            "  #{} {} [{}] name={:?} state={} level={}",
            device.id,
            device.uid,
            device.category.description(),
            device.name,
            device.state,
            device.level
        );
    }
    println!("Events shed under load: {}", driver.dropped_events());

    driver.shutdown().await;
    Ok(())
}
