//! Prefetch worker thread
//!
//! Owns its own surface and a mirrored font registry. Talks to the
//! foreground only through two FIFO channels of encoded frames.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use smol::channel::{self, Receiver, Sender, TryRecvError};
use smol::Timer;

use crate::raster::{rasterize_glyph, valid_size, RasterParams};
use crate::registry::FontRegistry;
use crate::surface::{RasterSurface, SurfaceFactory};
use crate::wire::{PrefetchRequest, PrefetchResponse, Request, Response, WireGlyph};

/// Foreground end of a running worker
pub(crate) struct WorkerHandle {
    requests: Sender<Vec<u8>>,
    responses: Receiver<Vec<u8>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Start a worker thread named `name`
    pub fn spawn(name: &str, factory: SurfaceFactory, params: RasterParams) -> io::Result<Self> {
        let (request_tx, request_rx) = channel::unbounded();
        let (response_tx, response_rx) = channel::unbounded();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(factory, params, request_rx, response_tx))?;

        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            thread: Some(thread),
        })
    }

    /// Queue a frame. Returns false once the worker has gone away.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.requests.try_send(frame).is_ok()
    }

    /// Next response frame, if one is waiting
    pub fn try_recv(&self) -> Result<Vec<u8>, TryRecvError> {
        self.responses.try_recv()
    }

    /// Wait up to `timeout` for the next response frame
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, TryRecvError> {
        smol::block_on(smol::future::or(
            async { self.responses.recv().await.map_err(|_| TryRecvError::Closed) },
            async {
                Timer::after(timeout).await;
                Err(TryRecvError::Empty)
            },
        ))
    }

    /// Close both channels and wait for the thread to exit
    pub fn shutdown(&mut self) {
        self.requests.close();
        self.responses.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Prefetch worker panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("running", &self.thread.is_some())
            .field("queued_requests", &self.requests.len())
            .field("queued_responses", &self.responses.len())
            .finish()
    }
}

/// Worker main loop; returns when the request channel closes
fn run(
    factory: SurfaceFactory,
    params: RasterParams,
    requests: Receiver<Vec<u8>>,
    responses: Sender<Vec<u8>>,
) {
    let Some(mut surface) = factory() else {
        tracing::warn!("Prefetch worker could not create a surface");
        return;
    };
    let mut registry = FontRegistry::new();

    while let Ok(frame) = requests.recv_blocking() {
        let request = match Request::decode(&frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Dropping malformed prefetch request: {}", e);
                continue;
            }
        };

        let response = match request {
            Request::LoadFont(load) => Response::FontLoaded {
                font_id: registry.register(&load.family, load.size),
            },
            Request::Prefetch(req) => {
                Response::Prefetched(rasterize_batch(surface.as_mut(), &registry, &req, &params))
            }
        };

        match response.encode() {
            Ok(frame) => {
                if responses.send_blocking(frame).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Cannot encode prefetch response: {}", e),
        }
    }
    tracing::debug!("Prefetch worker exiting");
}

/// Rasterize every valid codepoint of a request. Unknown fonts, invalid
/// sizes and invalid codepoints contribute nothing.
fn rasterize_batch(
    surface: &mut dyn RasterSurface,
    registry: &FontRegistry,
    req: &PrefetchRequest,
    params: &RasterParams,
) -> PrefetchResponse {
    let mut response = PrefetchResponse {
        font_id: req.font_id,
        size: req.size as u32,
        glyphs: Vec::new(),
    };

    let Some(font) = registry.lookup(req.font_id) else {
        tracing::debug!("Prefetch for unknown font {}", req.font_id);
        return response;
    };
    if !valid_size(req.size) {
        tracing::debug!("Prefetch at invalid size {}", req.size);
        return response;
    }

    response.glyphs = req
        .codepoints
        .iter()
        .filter_map(|&cp| char::from_u32(cp).map(|ch| (cp, ch)))
        .map(|(codepoint, ch)| {
            let glyph = rasterize_glyph(surface, font, ch, req.size, params);
            WireGlyph {
                codepoint,
                metrics: glyph.metrics,
                pixels: glyph.pixels,
            }
        })
        .collect();
    response
}
