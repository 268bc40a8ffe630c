//! Vigil camera node with a line-oriented bench shell

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vigil::capture::{SensorDriver, SyntheticSensor};
use vigil::config::SourceKind;
use vigil::pipeline::detector::{DetectionModel, DetectorKind, LoadError, NoopModel};
use vigil::{Config, Direction, Node};

const HELP: &str = "\
===========================
h: show commands
i: initialize camera and inference
d: deinitialize camera and inference
+: increase camera resolution
-: decrease camera resolution
s: take a photo and queue it for inference
p: print inference statistics
e: exit
===========================";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Vigil Launching...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let mut node = Node::new(&config, sensor_driver(&config)?)?;
    node.start_worker()?;

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "h" => println!("{HELP}"),
            "i" => {
                report(node.init_inference(Arc::new(model_loader)).await);
                report(node.init_camera().await);
            }
            "d" => report(node.deinit().await),
            "+" => report(node.change_resolution(Direction::Increase).await),
            "-" => report(node.change_resolution(Direction::Decrease).await),
            "s" => report(node.capture_and_submit().await),
            "p" => {
                let stats = node.stats();
                println!(
                    "inferences: {}  avg: {:.1} ms  peak working set: {} KB",
                    stats.total_count, stats.avg_ms, stats.max_working_set_kb
                );
                if let Some(done) = node.last_inference() {
                    println!(
                        "last request #{}: detected={} count={} confidence={:.2}",
                        done.request_id,
                        done.result.detected,
                        done.result.count,
                        done.result.confidence
                    );
                }
            }
            "e" => break,
            "" => {}
            other => warn!("Unknown command {other:?}, try h"),
        }
    }

    info!("Vigil shutting down");
    node.shutdown().await?;
    Ok(())
}

fn sensor_driver(config: &Config) -> Result<Box<dyn SensorDriver>> {
    match config.sensor.source {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSensor::new())),
        #[cfg(feature = "v4l2")]
        SourceKind::V4l2 => Ok(Box::new(vigil::capture::V4l2Sensor::new())),
        #[cfg(not(feature = "v4l2"))]
        SourceKind::V4l2 => Err(color_eyre::eyre::eyre!("built without the `v4l2` feature")),
    }
}

fn model_loader(kind: DetectorKind) -> std::result::Result<Box<dyn DetectionModel>, LoadError> {
    warn!(?kind, "no model backend linked, detector will report nothing");
    Ok(Box::new(NoopModel))
}

fn report<T: Debug>(outcome: vigil::Result<T>) {
    match outcome {
        Ok(value) => info!("OK: {value:?}"),
        Err(e) => error!(status = e.status_code(), "{e}"),
    }
}
