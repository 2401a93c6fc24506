// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The meter-reader interface consumed by the worker (spec §6):
//! `read_meters(deadline) -> PowerUseSample`, bracketed by the actual
//! acquisition window. Failure never propagates as an error — it leaves
//! `t0` at the zero sentinel, per spec §4.5.5's "meters absent" branch.

use async_trait::async_trait;
use chrono::Utc;
use hydro_types::{PowerUse, PowerUseSample};
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Source of electricity-meter readings.
#[async_trait]
pub trait MeterReader: Send + Sync {
    /// Reads the meters, bounded by `deadline`. On any failure (timeout,
    /// transport error, malformed response) returns
    /// [`PowerUseSample::absent`] rather than an error — the engine's
    /// meter-readiness gate (spec §4.5.5) treats that as "meters absent".
    async fn read_meters(&self, deadline: Duration) -> PowerUseSample;
}

/// In-memory test double: returns a fixed (or queued) sample, or simulates
/// a failure.
#[derive(Debug, Default)]
pub struct InMemoryMeterReader {
    queue: Mutex<Vec<PowerUseSample>>,
    fallback: Mutex<Option<PowerUseSample>>,
}

impl InMemoryMeterReader {
    pub fn fixed(sample: PowerUseSample) -> Self {
        Self { queue: Mutex::new(Vec::new()), fallback: Mutex::new(Some(sample)) }
    }

    /// Queues samples to be returned in order, one per call; once
    /// exhausted, falls back to the last-queued sample forever.
    pub fn queue(samples: Vec<PowerUseSample>) -> Self {
        let fallback = samples.last().copied();
        let mut samples = samples;
        samples.reverse();
        Self { queue: Mutex::new(samples), fallback: Mutex::new(fallback) }
    }
}

#[async_trait]
impl MeterReader for InMemoryMeterReader {
    async fn read_meters(&self, _deadline: Duration) -> PowerUseSample {
        let mut queue = self.queue.lock();
        if let Some(sample) = queue.pop() {
            return sample;
        }
        (*self.fallback.lock()).unwrap_or_else(PowerUseSample::absent)
    }
}

/// Wire-shaped HTTP meter reader: `GET {base_url}` is expected to return
/// `{"generated_w": f32, "here_w": f32, "neighbour_w": f32}`; `t0`/`t1`
/// bracket the request round trip. This shows the intended shape of a
/// meter-polling client, not a specific vendor's API (out of scope per
/// spec.md §1).
pub struct HttpMeterReader {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct MeterResponse {
    generated_w: f32,
    here_w: f32,
    neighbour_w: f32,
}

impl HttpMeterReader {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl MeterReader for HttpMeterReader {
    async fn read_meters(&self, deadline: Duration) -> PowerUseSample {
        let t0 = Utc::now();
        let result = tokio::time::timeout(deadline, async {
            let resp = self.client.get(&self.url).send().await?;
            resp.error_for_status()?.json::<MeterResponse>().await
        })
        .await;
        let t1 = Utc::now();

        match result {
            Ok(Ok(body)) => PowerUseSample {
                power_use: PowerUse { generated: body.generated_w, here: body.here_w, neighbour: body.neighbour_w },
                t0,
                t1,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "meter read failed");
                PowerUseSample::absent()
            }
            Err(_) => {
                warn!(deadline_ms = deadline.as_millis(), "meter read timed out");
                PowerUseSample::absent()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_fixed_reader_repeats_the_same_sample() {
        let sample = PowerUseSample {
            power_use: PowerUse { generated: 1000.0, here: 500.0, neighbour: 200.0 },
            t0: Utc::now(),
            t1: Utc::now(),
        };
        let reader = InMemoryMeterReader::fixed(sample);
        let a = reader.read_meters(Duration::from_secs(1)).await;
        let b = reader.read_meters(Duration::from_secs(1)).await;
        assert_eq!(a.power_use, sample.power_use);
        assert_eq!(b.power_use, sample.power_use);
    }

    #[tokio::test]
    async fn in_memory_queue_drains_then_repeats_last() {
        let s1 = PowerUseSample { power_use: PowerUse { generated: 1.0, here: 0.0, neighbour: 0.0 }, t0: Utc::now(), t1: Utc::now() };
        let s2 = PowerUseSample { power_use: PowerUse { generated: 2.0, here: 0.0, neighbour: 0.0 }, t0: Utc::now(), t1: Utc::now() };
        let reader = InMemoryMeterReader::queue(vec![s1, s2]);
        assert_eq!(reader.read_meters(Duration::from_secs(1)).await.power_use.generated, 1.0);
        assert_eq!(reader.read_meters(Duration::from_secs(1)).await.power_use.generated, 2.0);
        assert_eq!(reader.read_meters(Duration::from_secs(1)).await.power_use.generated, 2.0);
    }

    #[tokio::test]
    async fn unreachable_http_reader_reports_absent_sample() {
        let reader = HttpMeterReader::new("http://127.0.0.1:1").unwrap();
        let sample = reader.read_meters(Duration::from_millis(200)).await;
        assert!(!sample.is_present());
    }
}
