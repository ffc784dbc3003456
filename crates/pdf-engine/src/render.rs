//! Interruptible page rendering
//!
//! A page raster is written into a single pixel buffer per view, so a render
//! for a new page or scale must cancel the one still in flight. Rendering
//! backends poll a [`CancellationToken`] while they work.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative cancellation flag shared between a view and its render job
///
/// Clones observe the same state.
///
/// ```
/// use scanmark_pdf::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// What to rasterize
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 0-based page index
    pub page_index: u32,
    /// Pixels per PDF point
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

/// An issued render, valid until the next [`RenderSlot::begin`]
#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub request: RenderRequest,
    pub generation: u64,
    pub token: CancellationToken,
}

/// Tracks the single in-flight render of a page view
#[derive(Debug, Default)]
pub struct RenderSlot {
    generation: u64,
    in_flight: Option<RenderTicket>,
}

impl RenderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a render, cancelling whatever was in flight
    pub fn begin(&mut self, request: RenderRequest) -> RenderTicket {
        if let Some(previous) = self.in_flight.take() {
            previous.token.cancel();
            tracing::debug!(
                page_index = previous.request.page_index,
                generation = previous.generation,
                "superseded in-flight render"
            );
        }

        self.generation += 1;
        let ticket =
            RenderTicket { request, generation: self.generation, token: CancellationToken::new() };
        self.in_flight = Some(ticket.clone());
        ticket
    }

    /// Whether `ticket` is still the latest render and was not cancelled
    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        !ticket.token.is_cancelled()
            && self.in_flight.as_ref().is_some_and(|t| t.generation == ticket.generation)
    }

    /// Mark `ticket` as done; returns `false` if it had been superseded
    pub fn finish(&mut self, ticket: &RenderTicket) -> bool {
        if self.is_current(ticket) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// Cancel the in-flight render, if any
    pub fn cancel(&mut self) {
        if let Some(ticket) = self.in_flight.take() {
            ticket.token.cancel();
        }
    }

    pub fn in_flight(&self) -> Option<&RenderTicket> {
        self.in_flight.as_ref()
    }
}
