//! Clears the host buffer and rasterizes the current page into it

use log::{debug, error, warn};

use crate::bridge::DisplayBridge;
use crate::engine::Engine;
use crate::error::PagerError;
use crate::geometry::Transform;
use crate::pixmap::WHITE;
use crate::session::DocumentSession;
use crate::target::RenderTarget;

/// Why a render pass did nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No device is bound
    Unbound,
    /// The session holds no page
    NoPage,
    /// The host buffer changed since the device was bound
    StaleBinding,
    /// The host has no buffer memory to lend
    BufferUnavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The page was drawn and the host was told about the new frame
    Presented,
    /// Nothing was drawn and the host was not signalled
    Skipped(SkipReason),
}

/// Renders pages through a fixed page transform.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderPipeline {
    transform: Transform,
}

impl RenderPipeline {
    /// Pipeline at 100% scale, no rotation.
    #[must_use]
    pub fn new() -> Self {
        Self::with_transform(Transform::identity())
    }

    #[must_use]
    pub fn with_transform(transform: Transform) -> Self {
        Self { transform }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Draws the loaded page into the host buffer and signals a new frame.
    ///
    /// The buffer is cleared to opaque white before the page is composited
    /// over it, so repeated renders of the same page produce the same bytes.
    /// A rasterization failure is returned without signalling the host.
    pub fn render<E: Engine, B: DisplayBridge>(
        &self,
        session: &DocumentSession<E>,
        target: &mut RenderTarget<E>,
        bridge: &mut B,
    ) -> Result<RenderOutcome, PagerError> {
        let Some(binding) = target.binding_mut() else {
            debug!("render skipped: no device bound");
            return Ok(RenderOutcome::Skipped(SkipReason::Unbound));
        };
        let Some(page) = session.page() else {
            debug!("render skipped: no page loaded");
            return Ok(RenderOutcome::Skipped(SkipReason::NoPage));
        };

        let geometry = bridge.geometry();
        let generation = bridge.generation();
        if !binding.matches(&geometry, generation) {
            warn!(
                "render skipped: device bound to {}x{} (generation {}), buffer is {}x{} (generation {generation})",
                binding.geometry.width,
                binding.geometry.height,
                binding.generation,
                geometry.width,
                geometry.height,
            );
            return Ok(RenderOutcome::Skipped(SkipReason::StaleBinding));
        }
        let Some(mut pixmap) = bridge.pixmap() else {
            warn!("render skipped: host buffer unavailable");
            return Ok(RenderOutcome::Skipped(SkipReason::BufferUnavailable));
        };

        // The rasterizer blends, so the previous frame must not show through.
        pixmap.fill(WHITE);

        session
            .engine()
            .run_page_contents(page, &mut binding.device, &mut pixmap, &self.transform)
            .map_err(|e| {
                error!("couldn't run page {}: {e}", session.current_page());
                PagerError::RenderFailed(e)
            })?;

        bridge.signal_frame_ready()?;
        debug!("presented page {}", session.current_page());
        Ok(RenderOutcome::Presented)
    }
}
