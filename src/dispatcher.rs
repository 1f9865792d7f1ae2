//! Event loop: applies host events in batches, renders once per batch

use std::ops::{BitOr, BitOrAssign};

use log::{debug, info, warn};

use crate::bridge::{ButtonLabel, DisplayBridge, DisplayHint, HostEvent};
use crate::engine::Engine;
use crate::error::PagerError;
use crate::geometry::{DisplayHints, FitMode};
use crate::pipeline::{RenderOutcome, RenderPipeline};
use crate::session::DocumentSession;
use crate::target::RenderTarget;

/// What a batch of events requires before the host sees the next frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dirty {
    /// Buffer geometry or resolution must be renegotiated
    pub rebuild: bool,
    /// Buffer contents must be redrawn
    pub render: bool,
}

impl Dirty {
    pub const CLEAN: Self = Self {
        rebuild: false,
        render: false,
    };
    pub const RENDER: Self = Self {
        rebuild: false,
        render: true,
    };
    pub const REBUILD: Self = Self {
        rebuild: true,
        render: true,
    };

    pub fn is_clean(&self) -> bool {
        !self.rebuild && !self.render
    }
}

impl BitOr for Dirty {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            rebuild: self.rebuild || rhs.rebuild,
            render: self.render || rhs.render,
        }
    }
}

impl BitOrAssign for Dirty {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Counters kept across the life of the loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches: u64,
    pub rebuilds: u64,
    pub renders: u64,
    pub frames: u64,
    pub failed_renders: u64,
}

/// Owns the session, the target and the bridge, and drives them from host
/// events.
pub struct EventDispatcher<E: Engine, B: DisplayBridge> {
    session: DocumentSession<E>,
    target: RenderTarget<E>,
    pipeline: RenderPipeline,
    bridge: B,
    hints: DisplayHints,
    fit_mode: FitMode,
    stats: DispatchStats,
}

impl<E: Engine, B: DisplayBridge> EventDispatcher<E, B> {
    /// Starts out with the host's current geometry as the hinted one.
    pub fn new(session: DocumentSession<E>, bridge: B, fit_mode: FitMode) -> Self {
        let hints = DisplayHints::from_geometry(&bridge.geometry());
        Self {
            session,
            target: RenderTarget::new(),
            pipeline: RenderPipeline::new(),
            bridge,
            hints,
            fit_mode,
            stats: DispatchStats::default(),
        }
    }

    pub fn session(&self) -> &DocumentSession<E> {
        &self.session
    }

    pub fn target(&self) -> &RenderTarget<E> {
        &self.target
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn hints(&self) -> &DisplayHints {
        &self.hints
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Loads the first page, binds the target and presents the first frame.
    pub fn start(&mut self) {
        // A broken first page is logged and leaves the buffer untouched.
        if let Err(e) = self.session.load_page(0) {
            debug!("starting without a page: {e}");
        }
        self.flush(Dirty::REBUILD);
    }

    /// Runs batches until the host closes the connection.
    pub fn run(&mut self) -> Result<(), PagerError> {
        while self.run_batch()? {}
        info!(
            "event stream closed after {} batches, {} frames",
            self.stats.batches, self.stats.frames
        );
        Ok(())
    }

    /// Waits for one event, drains everything queued behind it and flushes
    /// the combined result. Returns `false` once the connection is closed.
    pub fn run_batch(&mut self) -> Result<bool, PagerError> {
        let Some(event) = self.bridge.wait_event()? else {
            return Ok(false);
        };

        let mut dirty = self.apply(event);
        let mut drained = 1;
        while let Some(event) = self.bridge.poll_event()? {
            dirty |= self.apply(event);
            drained += 1;
        }

        self.stats.batches += 1;
        debug!("batch of {drained} events: {dirty:?}");
        self.flush(dirty);
        Ok(true)
    }

    /// Applies one event and reports what it invalidated.
    pub fn apply(&mut self, event: HostEvent) -> Dirty {
        match event {
            HostEvent::Button { label, active } => self.apply_button(label, active),
            HostEvent::DisplayHint(hint) => self.apply_hint(&hint),
            HostEvent::ContentSeek(target) => {
                debug!("content seek to {target:?} ignored");
                Dirty::CLEAN
            }
            HostEvent::BufferChunkIn(descriptor) => {
                debug!("incoming buffer chunk {descriptor:?} ignored");
                Dirty::CLEAN
            }
            HostEvent::Other => Dirty::CLEAN,
        }
    }

    fn apply_button(&mut self, label: ButtonLabel, active: bool) -> Dirty {
        if !active {
            return Dirty::CLEAN;
        }

        let delta = match label {
            ButtonLabel::Activate => 1,
            ButtonLabel::PreviousPage => -1,
        };
        // A failed load is logged by the session and renders nothing.
        if let Err(e) = self.session.advance(delta) {
            debug!("page step {delta:+} left no page: {e}");
        }

        match self.fit_mode {
            FitMode::Dynamic => Dirty::REBUILD,
            FitMode::Fixed => Dirty::RENDER,
        }
    }

    /// Size applies only when both sides are present and non-zero; density
    /// only when present, non-zero and different.
    fn apply_hint(&mut self, hint: &DisplayHint) -> Dirty {
        let mut changed = false;

        if let (Some(width), Some(height)) = (hint.width, hint.height) {
            if width != 0 && height != 0 && (width, height) != (self.hints.width, self.hints.height)
            {
                self.hints.width = width;
                self.hints.height = height;
                changed = true;
            }
        }

        if let Some(density) = hint.density {
            if density != 0.0 && density != self.hints.density {
                self.hints.density = density;
                changed = true;
            }
        }

        if changed {
            debug!(
                "display hint: {}x{} at {} px/cm",
                self.hints.width, self.hints.height, self.hints.density
            );
            Dirty::REBUILD
        } else {
            Dirty::CLEAN
        }
    }

    /// Rebuilds and renders as `dirty` asks. Every failure here is logged
    /// and costs at most this frame; the loop itself keeps going.
    fn flush(&mut self, dirty: Dirty) {
        if dirty.is_clean() {
            return;
        }

        if dirty.rebuild {
            self.stats.rebuilds += 1;
            // Renders no-op until the next rebuild succeeds.
            if let Err(e) = self.target.rebuild(
                &self.session,
                &mut self.bridge,
                &self.hints,
                self.fit_mode,
            ) {
                debug!("target left unbound: {e}");
            }
        }

        self.stats.renders += 1;
        match self
            .pipeline
            .render(&self.session, &mut self.target, &mut self.bridge)
        {
            Ok(RenderOutcome::Presented) => self.stats.frames += 1,
            Ok(RenderOutcome::Skipped(reason)) => debug!("nothing presented: {reason:?}"),
            Err(e) => {
                self.stats.failed_renders += 1;
                warn!("frame dropped: {e}");
            }
        }
    }
}
