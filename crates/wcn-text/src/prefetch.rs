//! Background prefetch pipeline (foreground side)
//!
//! Starts the worker lazily, mirrors font registrations to it, sends prefetch
//! batches and hands decoded responses back for merging. If the worker cannot
//! be started, or later goes away, every call becomes a no-op.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use smol::channel::TryRecvError;

use crate::config::GlyphConfig;
use crate::raster::RasterParams;
use crate::surface::SurfaceFactory;
use crate::wire::{LoadFont, PrefetchRequest, PrefetchResponse, Request, Response, MAX_BATCH, MAX_NAME_LEN};
use crate::worker::WorkerHandle;

/// Frequently used CJK punctuation, prefetched along with printable ASCII
pub const COMMON_PUNCTUATION: [u32; 19] = [
    0xFF0C, 0x3002, 0xFF01, 0xFF1F, 0x3001, 0xFF1B, 0xFF1A, 0x201C, 0x201D, 0x2018,
    0x2019, 0xFF08, 0xFF09, 0x3010, 0x3011, 0x300A, 0x300B, 0x2014, 0x2026,
];

/// Printable ASCII followed by `COMMON_PUNCTUATION`
pub fn common_codepoints() -> impl Iterator<Item = u32> {
    (32..127).chain(COMMON_PUNCTUATION)
}

/// Prefetch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Prefetch frames sent to the worker
    pub requests_sent: u64,
    /// Prefetch responses handed back for merging
    pub responses_merged: u64,
    /// Glyphs carried by those responses
    pub glyphs_merged: u64,
    /// Response frames that failed to decode
    pub frames_dropped: u64,
}

enum Link {
    Unstarted,
    Running(WorkerHandle),
    Unavailable,
}

pub(crate) struct Prefetcher {
    link: Link,
    enabled: bool,
    worker_name: String,
    factory: SurfaceFactory,
    params: RasterParams,
    /// Font ids mirrored to the worker, awaiting its reply
    pending_fonts: VecDeque<u32>,
    /// Prefetch requests not yet answered
    in_flight: usize,
    stats: PrefetchStats,
}

impl Prefetcher {
    pub fn new(config: &GlyphConfig, factory: SurfaceFactory) -> Self {
        Self {
            link: Link::Unstarted,
            enabled: config.background,
            worker_name: config.worker_name.clone(),
            factory,
            params: RasterParams::from(config),
            pending_fonts: VecDeque::new(),
            in_flight: 0,
            stats: PrefetchStats::default(),
        }
    }

    /// Start the worker on first use. Only ever attempted once.
    fn ensure_started(&mut self) {
        if !matches!(self.link, Link::Unstarted) {
            return;
        }
        if !self.enabled {
            self.link = Link::Unavailable;
            return;
        }

        match WorkerHandle::spawn(&self.worker_name, self.factory.clone(), self.params) {
            Ok(worker) => {
                tracing::info!("Started prefetch worker '{}'", self.worker_name);
                self.link = Link::Running(worker);
            }
            Err(e) => {
                tracing::warn!("Prefetch worker unavailable: {}", e);
                self.link = Link::Unavailable;
            }
        }
    }

    /// Is the worker running?
    pub fn is_available(&self) -> bool {
        matches!(self.link, Link::Running(_))
    }

    /// Prefetch requests sent but not yet answered
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn stats(&self) -> PrefetchStats {
        self.stats
    }

    /// Queue a frame for the worker; a closed channel disables prefetching
    fn send(&mut self, frame: Vec<u8>) -> bool {
        let Link::Running(worker) = &self.link else {
            return false;
        };
        if worker.send(frame) {
            return true;
        }
        self.disconnect();
        false
    }

    fn disconnect(&mut self) {
        if matches!(self.link, Link::Running(_)) {
            tracing::warn!("Prefetch worker went away; continuing without it");
        }
        self.link = Link::Unavailable;
        self.pending_fonts.clear();
        self.in_flight = 0;
    }

    /// Replay a registration in the worker's registry
    pub fn mirror_font(&mut self, font_id: u32, family: &str, size: f32) {
        self.ensure_started();
        if !self.is_available() {
            return;
        }

        let request = Request::LoadFont(LoadFont {
            family: truncate_name(family).to_string(),
            size,
        });
        match request.encode() {
            Ok(frame) => {
                if self.send(frame) {
                    self.pending_fonts.push_back(font_id);
                }
            }
            Err(e) => tracing::warn!("Cannot mirror font {}: {}", font_id, e),
        }
    }

    /// Send `codepoints` in as many frames as needed. Returns frames sent.
    pub fn request(&mut self, font_id: u32, size: f32, codepoints: &[u32]) -> usize {
        self.ensure_started();

        let mut sent = 0;
        for chunk in codepoints.chunks(MAX_BATCH) {
            if !self.is_available() {
                break;
            }
            let request = Request::Prefetch(PrefetchRequest {
                font_id,
                size,
                codepoints: chunk.to_vec(),
            });
            let frame = match request.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Cannot encode prefetch request: {}", e);
                    continue;
                }
            };
            if self.send(frame) {
                self.in_flight += 1;
                self.stats.requests_sent += 1;
                sent += 1;
            }
        }
        sent
    }

    /// Hand every waiting response to `merge` without blocking.
    /// Returns the number of prefetch responses handled.
    pub fn poll(&mut self, mut merge: impl FnMut(PrefetchResponse)) -> usize {
        let mut handled = 0;
        loop {
            let Link::Running(worker) = &self.link else {
                return handled;
            };
            match worker.try_recv() {
                Ok(frame) => {
                    if self.handle_frame(&frame, &mut merge) {
                        handled += 1;
                    }
                }
                Err(TryRecvError::Empty) => return handled,
                Err(TryRecvError::Closed) => {
                    self.disconnect();
                    return handled;
                }
            }
        }
    }

    /// Block until every sent prefetch request is answered or `timeout`
    /// passes. Returns true when nothing is left in flight.
    pub fn settle(&mut self, timeout: Duration, mut merge: impl FnMut(PrefetchResponse)) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight > 0 {
            let Link::Running(worker) = &self.link else {
                break;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match worker.recv_timeout(remaining) {
                Ok(frame) => {
                    self.handle_frame(&frame, &mut merge);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => self.disconnect(),
            }
        }
        self.in_flight == 0
    }

    /// Decode one response frame. Returns true for a prefetch response.
    fn handle_frame(&mut self, frame: &[u8], merge: &mut impl FnMut(PrefetchResponse)) -> bool {
        let response = match Response::decode(frame) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Dropping malformed prefetch response: {}", e);
                self.stats.frames_dropped += 1;
                return false;
            }
        };

        match response {
            Response::FontLoaded { font_id } => {
                match self.pending_fonts.pop_front() {
                    Some(expected) if expected == font_id => {}
                    Some(expected) => tracing::warn!(
                        "Prefetch worker registered font {} as {}", expected, font_id
                    ),
                    None => tracing::warn!("Unexpected font registration reply: {}", font_id),
                }
                false
            }
            Response::Prefetched(resp) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.stats.responses_merged += 1;
                self.stats.glyphs_merged += resp.glyphs.len() as u64;
                merge(resp);
                true
            }
        }
    }

    /// Stop the worker for good
    pub fn shutdown(&mut self) {
        self.link = Link::Unavailable;
        self.pending_fonts.clear();
        self.in_flight = 0;
    }
}

/// Cut a font name to what a frame can carry, at a char boundary
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    tracing::warn!("Font name truncated from {} to {} bytes", name.len(), end);
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::surface::mock::MockSurface;
    use crate::surface::RasterSurface;
    use crate::wire::WireGlyph;
    use crate::raster::BitmapMetrics;

    fn prefetcher(background: bool) -> Prefetcher {
        let factory: SurfaceFactory =
            Arc::new(|| Some(Box::new(MockSurface::new()) as Box<dyn RasterSurface>));
        let config = GlyphConfig { background, ..Default::default() };
        Prefetcher::new(&config, factory)
    }

    #[test]
    fn test_common_codepoints() {
        let cps: Vec<u32> = common_codepoints().collect();
        assert_eq!(cps.len(), 95 + 19);
        assert_eq!(cps[0], 32);
        assert_eq!(cps[94], 126);
        assert_eq!(cps[95], 0xFF0C);
        assert_eq!(*cps.last().unwrap(), 0x2026);
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("Noto Sans"), "Noto Sans");

        // 3-byte chars straddle the frame limit
        let long = "字".repeat(MAX_NAME_LEN / 3 + 1);
        let cut = truncate_name(&long);
        assert!(cut.len() <= MAX_NAME_LEN);
        assert_eq!(cut.len() % 3, 0);
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut p = prefetcher(false);
        p.mirror_font(1, "Test", 16.0);
        assert_eq!(p.request(1, 16.0, &[65, 66]), 0);
        assert!(!p.is_available());
        assert_eq!(p.poll(|_| panic!("no responses expected")), 0);
        assert!(p.settle(Duration::from_millis(10), |_| {}));
        assert_eq!(p.stats(), PrefetchStats::default());
    }

    #[test]
    fn test_round_trip_through_worker() {
        let mut p = prefetcher(true);
        p.mirror_font(1, "Test", 16.0);
        assert!(p.is_available());
        assert_eq!(p.request(1, 16.0, &[65, 66, 67]), 1);
        assert_eq!(p.in_flight(), 1);

        let mut merged = Vec::new();
        assert!(p.settle(Duration::from_secs(5), |resp| merged.push(resp)));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].glyphs.len(), 3);

        let stats = p.stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.responses_merged, 1);
        assert_eq!(stats.glyphs_merged, 3);
    }

    #[test]
    fn test_large_request_split() {
        let mut p = prefetcher(true);
        p.mirror_font(1, "Test", 8.0);
        let cps = vec![0xD800; MAX_BATCH + 10];
        assert_eq!(p.request(1, 8.0, &cps), 2);
        assert!(p.settle(Duration::from_secs(10), |resp| assert!(resp.glyphs.is_empty())));
        assert_eq!(p.stats().responses_merged, 2);
    }

    #[test]
    fn test_font_id_divergence_consumes_pending() {
        let mut p = prefetcher(false);
        p.pending_fonts.push_back(1);
        p.pending_fonts.push_back(2);

        let frame = Response::FontLoaded { font_id: 5 }.encode().unwrap();
        assert!(!p.handle_frame(&frame, &mut |_| {}));
        assert_eq!(p.pending_fonts, VecDeque::from(vec![2]));
    }

    #[test]
    fn test_malformed_response_counted() {
        let mut p = prefetcher(false);
        assert!(!p.handle_frame(&[7, 7, 7], &mut |_| {}));
        assert_eq!(p.stats().frames_dropped, 1);
    }

    #[test]
    fn test_prefetched_frame_merged() {
        let mut p = prefetcher(false);
        p.in_flight = 1;
        let frame = Response::Prefetched(PrefetchResponse {
            font_id: 1,
            size: 16,
            glyphs: vec![WireGlyph {
                codepoint: 65,
                metrics: BitmapMetrics {
                    width: 1,
                    height: 1,
                    offset_x: 0.0,
                    offset_y: 0.0,
                    advance: 4.0,
                    is_color: false,
                },
                pixels: vec![0; 4],
            }],
        })
        .encode()
        .unwrap();

        let mut seen = 0;
        assert!(p.handle_frame(&frame, &mut |resp| seen += resp.glyphs.len()));
        assert_eq!(seen, 1);
        assert_eq!(p.in_flight(), 0);
    }
}
