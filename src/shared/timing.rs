//! Timing utilities for relayed calls.
//!
//! All measurements use the monotonic clock. Phase marks are recorded for the
//! first hop only; the total spans every hop up to full body receipt.

use crate::relay::types::TimingInfo;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RelayTiming {
    pub total_start: Instant,
    pub dns_start: Option<Instant>,
    pub dns_end: Option<Instant>,
    pub connect_start: Option<Instant>,
    pub connect_end: Option<Instant>,
    pub tls_start: Option<Instant>,
    pub tls_end: Option<Instant>,
    pub request_start: Option<Instant>,
    pub ttfb: Option<Instant>,
    pub download_start: Option<Instant>,
    pub download_end: Option<Instant>,
}

fn span_ms(start: Option<Instant>, end: Option<Instant>) -> Option<u64> {
    match (start, end) {
        (Some(s), Some(e)) => Some(e.saturating_duration_since(s).as_millis() as u64),
        _ => None,
    }
}

impl RelayTiming {
    /// Starts the total timer.
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            dns_start: None,
            dns_end: None,
            connect_start: None,
            connect_end: None,
            tls_start: None,
            tls_end: None,
            request_start: None,
            ttfb: None,
            download_start: None,
            download_end: None,
        }
    }

    /// Milliseconds from start to full body receipt, or to now if the body
    /// was never completed.
    pub fn total_ms(&self) -> u64 {
        self.download_end
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.total_start)
            .as_millis() as u64
    }

    pub fn to_timing_info(&self) -> TimingInfo {
        TimingInfo {
            total: self.total_ms(),
            dns: span_ms(self.dns_start, self.dns_end),
            connect: span_ms(self.connect_start, self.connect_end),
            tls: span_ms(self.tls_start, self.tls_end),
            ttfb: span_ms(self.request_start, self.ttfb),
            download: span_ms(self.download_start, self.download_end),
        }
    }

    pub fn start_dns(&mut self) {
        self.dns_start = Some(Instant::now());
    }

    pub fn end_dns(&mut self) {
        self.dns_end = Some(Instant::now());
    }

    pub fn start_connect(&mut self) {
        self.connect_start = Some(Instant::now());
    }

    pub fn end_connect(&mut self) {
        self.connect_end = Some(Instant::now());
    }

    pub fn start_tls(&mut self) {
        self.tls_start = Some(Instant::now());
    }

    pub fn end_tls(&mut self) {
        self.tls_end = Some(Instant::now());
    }

    pub fn start_request(&mut self) {
        self.request_start = Some(Instant::now());
    }

    pub fn mark_ttfb(&mut self) {
        self.ttfb = Some(Instant::now());
    }

    pub fn start_download(&mut self) {
        self.download_start = Some(Instant::now());
    }

    /// Called once a hop's body is complete; later hops overwrite earlier
    /// marks so the total always reflects the last byte.
    pub fn end_download(&mut self) {
        self.download_end = Some(Instant::now());
    }

    /// Unfreezes the total before another hop goes out.
    pub fn begin_hop(&mut self) {
        self.download_end = None;
    }
}

impl Default for RelayTiming {
    fn default() -> Self {
        Self::new()
    }
}
