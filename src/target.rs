//! Draw device bound to the host's pixel buffer

use log::{debug, error, info, warn};

use crate::bridge::DisplayBridge;
use crate::engine::Engine;
use crate::error::{EngineError, PagerError};
use crate::geometry::{DisplayGeometry, DisplayHints, FitMode, Transform};
use crate::session::DocumentSession;

/// A live device together with the buffer layout it was created for.
pub(crate) struct Binding<D> {
    pub(crate) device: D,
    pub(crate) geometry: DisplayGeometry,
    pub(crate) generation: u64,
}

impl<D> Binding<D> {
    /// Whether the host buffer still has the layout this device draws into.
    pub(crate) fn matches(&self, geometry: &DisplayGeometry, generation: u64) -> bool {
        self.generation == generation
            && self.geometry.width == geometry.width
            && self.geometry.height == geometry.height
            && self.geometry.stride == geometry.stride
    }
}

/// Either unbound, or bound to exactly one device for the current buffer.
///
/// The target never owns pixel memory: the device is tied to a layout and
/// a buffer generation, and the pixels themselves are borrowed from the
/// bridge for the duration of each render.
pub struct RenderTarget<E: Engine> {
    binding: Option<Binding<E::Device>>,
}

impl<E: Engine> Default for RenderTarget<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> RenderTarget<E> {
    #[must_use]
    pub fn new() -> Self {
        Self { binding: None }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Layout of the bound buffer, density included.
    pub fn geometry(&self) -> Option<DisplayGeometry> {
        self.binding.as_ref().map(|b| b.geometry)
    }

    pub(crate) fn binding_mut(&mut self) -> Option<&mut Binding<E::Device>> {
        self.binding.as_mut()
    }

    /// Drops the bound device, if any.
    pub fn release(&mut self) {
        if self.binding.take().is_some() {
            debug!("released draw device");
        }
    }

    /// Tears down the current binding and binds a fresh device.
    ///
    /// In dynamic fit the host is asked for a buffer the size of the page
    /// at 100%; in fixed fit for the size it hinted. A refused resize is
    /// logged and the device binds to whatever the host reports. On failure
    /// the target stays unbound.
    pub fn rebuild<B: DisplayBridge>(
        &mut self,
        session: &DocumentSession<E>,
        bridge: &mut B,
        hints: &DisplayHints,
        fit_mode: FitMode,
    ) -> Result<(), PagerError> {
        self.release();

        let (width, height) = requested_size(session, hints, fit_mode);
        if let Err(e) = bridge.resize(width, height) {
            warn!("host refused resize to {width}x{height}: {e}");
        }

        let geometry = DisplayGeometry {
            density: hints.density,
            ..bridge.geometry()
        };
        if geometry.is_empty() {
            return Err(build_failed(EngineError::generic(format!(
                "empty buffer {}x{}",
                geometry.width, geometry.height
            ))));
        }
        if bridge.pixmap().is_none() {
            return Err(build_failed(EngineError::generic(format!(
                "host buffer can't hold {}x{} with stride {}",
                geometry.width, geometry.height, geometry.stride
            ))));
        }

        let device = session
            .engine()
            .new_draw_device(&geometry)
            .map_err(build_failed)?;

        info!(
            "bound {}x{} at {:.0} dpi ({} fit)",
            geometry.width,
            geometry.height,
            geometry.dpi(),
            fit_mode.as_str()
        );
        self.binding = Some(Binding {
            device,
            geometry,
            generation: bridge.generation(),
        });
        Ok(())
    }
}

fn build_failed(source: EngineError) -> PagerError {
    error!("render target build failed: {source}");
    PagerError::TargetBuildFailed(source)
}

/// Buffer size to ask the host for.
fn requested_size<E: Engine>(
    session: &DocumentSession<E>,
    hints: &DisplayHints,
    fit_mode: FitMode,
) -> (u32, u32) {
    if fit_mode == FitMode::Dynamic {
        match session.page_bounds(&Transform::identity()) {
            Some(rect) => {
                let bbox = rect.round();
                if !bbox.is_empty() {
                    return (bbox.width(), bbox.height());
                }
                warn!("page has an empty bounding box, using host size");
            }
            None => debug!("no page to fit, using host size"),
        }
    }
    (hints.width, hints.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock::{MockBridge, MockEngine};

    fn hints(width: u32, height: u32) -> DisplayHints {
        DisplayHints {
            width,
            height,
            density: 38.4,
        }
    }

    fn loaded_session(engine: &MockEngine) -> DocumentSession<MockEngine> {
        let mut session = DocumentSession::open(engine.clone(), "doc.pdf").unwrap();
        session.load_page(0).unwrap();
        session
    }

    #[test]
    fn fixed_fit_binds_at_hinted_size() {
        let engine = MockEngine::with_pages(1);
        let session = loaded_session(&engine);
        let mut bridge = MockBridge::new(640, 480, 38.4);
        let mut target = RenderTarget::new();

        target
            .rebuild(&session, &mut bridge, &hints(800, 600), FitMode::Fixed)
            .unwrap();

        assert_eq!(bridge.resizes, vec![(800, 600)]);
        let geometry = target.geometry().unwrap();
        assert_eq!((geometry.width, geometry.height), (800, 600));
    }

    #[test]
    fn dynamic_fit_sizes_to_page() {
        let engine = MockEngine::with_page_sizes(vec![(300.4, 199.6)]);
        let session = loaded_session(&engine);
        let mut bridge = MockBridge::new(640, 480, 38.4);
        let mut target = RenderTarget::new();

        target
            .rebuild(&session, &mut bridge, &hints(800, 600), FitMode::Dynamic)
            .unwrap();

        assert_eq!(bridge.resizes, vec![(301, 200)]);
    }

    #[test]
    fn dynamic_fit_without_page_falls_back_to_hint() {
        let engine = MockEngine::with_pages(1);
        let session = DocumentSession::open(engine.clone(), "doc.pdf").unwrap();
        let mut bridge = MockBridge::new(640, 480, 38.4);
        let mut target = RenderTarget::new();

        target
            .rebuild(&session, &mut bridge, &hints(320, 240), FitMode::Dynamic)
            .unwrap();

        assert_eq!(bridge.resizes, vec![(320, 240)]);
    }

    #[test]
    fn resolution_comes_from_hinted_density() {
        let engine = MockEngine::with_pages(1);
        let session = loaded_session(&engine);
        let mut bridge = MockBridge::new(640, 480, 38.4);
        let mut target = RenderTarget::new();
        let hints = DisplayHints {
            width: 640,
            height: 480,
            density: 50.0,
        };

        target
            .rebuild(&session, &mut bridge, &hints, FitMode::Fixed)
            .unwrap();

        assert!((engine.device_dpi() - 127.0).abs() < 1e-3);
    }

    #[test]
    fn rebuild_releases_previous_device_first() {
        let engine = MockEngine::with_pages(1);
        let session = loaded_session(&engine);
        let mut bridge = MockBridge::new(640, 480, 38.4);
        let mut target = RenderTarget::new();

        for _ in 0..3 {
            target
                .rebuild(&session, &mut bridge, &hints(640, 480), FitMode::Fixed)
                .unwrap();
            assert_eq!(engine.live_devices(), 1);
        }
        assert_eq!(engine.devices_created(), 3);
    }

    #[test]
    fn failed_device_leaves_target_unbound() {
        let engine = MockEngine::with_pages(1);
        let session = loaded_session(&engine);
        let mut bridge = MockBridge::new(640, 480, 38.4);
        let mut target = RenderTarget::new();
        target
            .rebuild(&session, &mut bridge, &hints(640, 480), FitMode::Fixed)
            .unwrap();

        engine.fail_device(true);
        let err = target
            .rebuild(&session, &mut bridge, &hints(640, 480), FitMode::Fixed)
            .err()
            .unwrap();

        assert!(matches!(err, PagerError::TargetBuildFailed(_)));
        assert!(!target.is_bound());
        assert_eq!(engine.live_devices(), 0);
    }

    #[test]
    fn refused_resize_binds_at_host_geometry() {
        let engine = MockEngine::with_pages(1);
        let session = loaded_session(&engine);
        let mut bridge = MockBridge::new(640, 480, 38.4);
        bridge.fail_resize = true;
        let mut target = RenderTarget::new();

        target
            .rebuild(&session, &mut bridge, &hints(800, 600), FitMode::Fixed)
            .unwrap();

        let geometry = target.geometry().unwrap();
        assert_eq!((geometry.width, geometry.height), (640, 480));
    }
}
