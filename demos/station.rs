// SPDX-License-Identifier: MPL-2.0

//! Demo: run a station on a simulated board against an in-memory store.
//!
//! Presses the button twice, flips the light from the "remote" side, and
//! prints the shared record after each step.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example station [-- <config.json>]
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use homelink::hal::SimPeripherals;
use homelink::remote::{MemoryStore, RemoteStore};
use homelink::{Station, StationConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = match env::args().nth(1) {
        Some(path) => StationConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => StationConfig::default().with_sensor(
            homelink::SamplerConfig::new("I2C1").with_period(Duration::from_millis(500)),
        ),
    };

    let board = SimPeripherals::new()
        .with_bus(&config.sensor.port)
        .with_pin(&config.led_port)
        .with_pin(&config.button_port);
    board.set_bus_value(&config.sensor.port, config.sensor.address, 22);
    // Button idles released: high on an active-low line.
    board.drive(&config.button_port, true);

    let store = MemoryStore::new();
    let root = config.bridge.root_path.clone();
    let mut station = Station::new(Arc::new(board.clone()), store.clone(), config.clone());
    station.start().await?;
    println!("Started: {:?}", store.read(&root).await?);

    println!("Pressing button...");
    board.drive(&config.button_port, false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("  light pin high: {:?}", board.level(&config.led_port));
    println!("  record: {:?}", store.read(&root).await?);

    println!("Releasing button...");
    board.drive(&config.button_port, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("  light pin high: {:?}", board.level(&config.led_port));

    println!("Switching light on remotely...");
    board.set_bus_value(&config.sensor.port, config.sensor.address, 24);
    store
        .write(&format!("{root}/light"), serde_json::json!(true))
        .await?;
    tokio::time::sleep(Duration::from_millis(600)).await;
    println!("  light pin high: {:?}", board.level(&config.led_port));
    println!("  record: {:?}", store.read(&root).await?);

    station.stop().await;
    println!(
        "Stopped. Handles acquired: {}, released: {}",
        board.acquired(),
        board.released()
    );
    Ok(())
}
