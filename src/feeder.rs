//! Metric sink feeder (component H, §4.H).
//!
//! Maintains a long-lived TCP connection to the metrics backend, tuned with
//! a 30-minute keep-alive via `socket2` the way the broader example pack
//! tunes raw sockets (the teacher's HTTP stack only tunes `reqwest`
//! clients, never a bare `TcpStream`). Every 60 s it emits a pilot-light
//! line, then drains each measured service's sample buffer and emits one
//! line per sample, reconnecting on any write failure.

use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::domain::CheckResult;
use crate::registry::Registry;

const TICK: Duration = Duration::from_secs(60);
const KEEPALIVE: Duration = Duration::from_secs(30 * 60);

pub struct MetricSinkFeeder {
    registry: Arc<Registry>,
    sink_addr: String,
    environment: String,
}

impl MetricSinkFeeder {
    pub fn new(registry: Arc<Registry>, sink_addr: String, environment: String) -> Self {
        Self { registry, sink_addr, environment }
    }

    /// Runs until the process shuts down; never returns under normal
    /// operation.
    pub async fn run(self) {
        let mut conn: Option<TcpStream> = None;
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if conn.is_none() {
                match self.connect().await {
                    Ok(stream) => conn = Some(stream),
                    Err(e) => {
                        warn!(error = %e, addr = %self.sink_addr, "metric sink connect failed");
                        continue;
                    }
                }
            }

            let stream = conn.as_mut().expect("connection established above");
            if let Err(e) = self.pilot_light(stream).await {
                warn!(error = %e, "pilot-light write failed, will reconnect");
                conn = None;
                continue;
            }

            for ms in self.registry.measured_services() {
                let mut buffer = ms.buffer_reader.lock().await;
                let samples = buffer.drain();
                for sample in samples {
                    if let Err(e) = self.emit(stream, &sample).await {
                        warn!(error = %e, service = %sample.name, "sample write failed, reconnecting");
                        buffer.requeue(sample, &ms.buffer_writer);
                        conn = None;
                        break;
                    }
                }
                if conn.is_none() {
                    break;
                }
            }
        }
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.sink_addr).await?;
        let keepalive = TcpKeepalive::new().with_time(KEEPALIVE);
        SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;
        Ok(stream)
    }

    async fn pilot_light(&self, stream: &mut TcpStream) -> io::Result<()> {
        let line = format!("coco.health.{}.pilot-light 1 {}\n", self.environment, unix_now());
        stream.write_all(line.as_bytes()).await
    }

    async fn emit(&self, stream: &mut TcpStream, sample: &CheckResult) -> io::Result<()> {
        let sanitised = sample.name.replace('.', "-");
        let value = if sample.ok { 0 } else { 1 };
        let ts = sample.last_updated.timestamp();
        let line = format!("coco.health.{}.services.{sanitised} {value} {ts}\n", self.environment);
        stream.write_all(line.as_bytes()).await
    }
}


fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
