pub mod mock {
    use std::cell::{Cell, RefCell};
    use std::collections::{HashSet, VecDeque};
    use std::path::Path;
    use std::rc::Rc;

    use crate::bridge::{DisplayBridge, HostEvent};
    use crate::engine::Engine;
    use crate::error::{BridgeError, EngineError};
    use crate::geometry::{DisplayGeometry, Rect, Transform};
    use crate::pixmap::HostPixmap;

    /// Colour the mock rasterizer paints page content with
    pub const INK: [u8; 4] = [0x10, 0x20, 0x30, 0xff];

    #[derive(Default)]
    struct EngineState {
        page_sizes: Vec<(f32, f32)>,
        report_count: bool,
        fail_open: Cell<bool>,
        fail_device: Cell<bool>,
        fail_run: Cell<bool>,
        failing_pages: RefCell<HashSet<i64>>,
        loaded: RefCell<Vec<i64>>,
        live_pages: Cell<usize>,
        live_devices: Cell<usize>,
        devices_created: Cell<usize>,
        device_dpi: Cell<f32>,
        runs: Cell<usize>,
    }

    /// Scripted document engine.
    ///
    /// Clones share state, so a test can keep one handle and move another
    /// into the code under test.
    #[derive(Clone, Default)]
    pub struct MockEngine {
        state: Rc<EngineState>,
    }

    pub struct MockDocument {
        page_sizes: Vec<(f32, f32)>,
    }

    pub struct MockPage {
        pub index: i64,
        width: f32,
        height: f32,
        state: Rc<EngineState>,
    }

    impl Drop for MockPage {
        fn drop(&mut self) {
            let live = &self.state.live_pages;
            live.set(live.get() - 1);
        }
    }

    pub struct MockDevice {
        width: u32,
        height: u32,
        state: Rc<EngineState>,
    }

    impl Drop for MockDevice {
        fn drop(&mut self) {
            let live = &self.state.live_devices;
            live.set(live.get() - 1);
        }
    }

    impl MockEngine {
        /// Document of `count` US-letter pages.
        pub fn with_pages(count: usize) -> Self {
            Self::with_page_sizes(vec![(612.0, 792.0); count])
        }

        pub fn with_page_sizes(page_sizes: Vec<(f32, f32)>) -> Self {
            Self::build(page_sizes, true)
        }

        /// Document whose page count is reported as zero.
        pub fn with_unknown_length(count: usize) -> Self {
            Self::build(vec![(612.0, 792.0); count], false)
        }

        fn build(page_sizes: Vec<(f32, f32)>, report_count: bool) -> Self {
            Self {
                state: Rc::new(EngineState {
                    page_sizes,
                    report_count,
                    ..EngineState::default()
                }),
            }
        }

        pub fn fail_open(&self, fail: bool) {
            self.state.fail_open.set(fail);
        }

        pub fn fail_device(&self, fail: bool) {
            self.state.fail_device.set(fail);
        }

        pub fn fail_run(&self, fail: bool) {
            self.state.fail_run.set(fail);
        }

        pub fn fail_page(&self, index: i64) {
            self.state.failing_pages.borrow_mut().insert(index);
        }

        pub fn heal_page(&self, index: i64) {
            self.state.failing_pages.borrow_mut().remove(&index);
        }

        pub fn live_pages(&self) -> usize {
            self.state.live_pages.get()
        }

        pub fn live_devices(&self) -> usize {
            self.state.live_devices.get()
        }

        pub fn devices_created(&self) -> usize {
            self.state.devices_created.get()
        }

        /// Resolution the most recent device was created with.
        pub fn device_dpi(&self) -> f32 {
            self.state.device_dpi.get()
        }

        pub fn runs(&self) -> usize {
            self.state.runs.get()
        }

        pub fn loaded_indices(&self) -> Vec<i64> {
            self.state.loaded.borrow().clone()
        }
    }

    impl Engine for MockEngine {
        type Document = MockDocument;
        type Page = MockPage;
        type Device = MockDevice;

        fn open(&self, path: &Path) -> Result<MockDocument, EngineError> {
            if self.state.fail_open.get() {
                return Err(EngineError::generic(format!(
                    "cannot open {}",
                    path.display()
                )));
            }
            Ok(MockDocument {
                page_sizes: self.state.page_sizes.clone(),
            })
        }

        fn page_count(&self, doc: &MockDocument) -> Result<usize, EngineError> {
            Ok(if self.state.report_count {
                doc.page_sizes.len()
            } else {
                0
            })
        }

        fn load_page(&self, doc: &MockDocument, index: i64) -> Result<MockPage, EngineError> {
            if self.state.failing_pages.borrow().contains(&index) {
                return Err(EngineError::generic(format!("page {index} is corrupt")));
            }
            let &(width, height) = usize::try_from(index)
                .ok()
                .and_then(|i| doc.page_sizes.get(i))
                .ok_or_else(|| EngineError::generic(format!("no page {index}")))?;

            self.state.loaded.borrow_mut().push(index);
            let live = &self.state.live_pages;
            live.set(live.get() + 1);

            Ok(MockPage {
                index,
                width,
                height,
                state: Rc::clone(&self.state),
            })
        }

        fn bound_page(&self, page: &MockPage, transform: &Transform) -> Result<Rect, EngineError> {
            Ok(transform.apply(Rect::new(0.0, 0.0, page.width, page.height)))
        }

        fn new_draw_device(&self, geometry: &DisplayGeometry) -> Result<MockDevice, EngineError> {
            if self.state.fail_device.get() {
                return Err(EngineError::generic("device creation failed"));
            }
            let state = &self.state;
            state.devices_created.set(state.devices_created.get() + 1);
            state.live_devices.set(state.live_devices.get() + 1);
            state.device_dpi.set(geometry.dpi());

            Ok(MockDevice {
                width: geometry.width,
                height: geometry.height,
                state: Rc::clone(&self.state),
            })
        }

        /// Paints the middle half of the page (in both directions) with [`INK`].
        fn run_page_contents(
            &self,
            page: &MockPage,
            device: &mut MockDevice,
            pixmap: &mut HostPixmap<'_>,
            transform: &Transform,
        ) -> Result<(), EngineError> {
            self.state.runs.set(self.state.runs.get() + 1);
            if self.state.fail_run.get() {
                return Err(EngineError::generic("syntax error in content stream"));
            }
            if device.width != pixmap.width() || device.height != pixmap.height() {
                return Err(EngineError::generic("device does not match buffer"));
            }

            let bounds = transform
                .apply(Rect::new(0.0, 0.0, page.width, page.height))
                .round();
            let x0 = (bounds.width() / 4).min(pixmap.width());
            let x1 = (bounds.width() * 3 / 4).min(pixmap.width());
            let y0 = (bounds.height() / 4).min(pixmap.height());
            let y1 = (bounds.height() * 3 / 4).min(pixmap.height());

            for y in y0..y1 {
                let row = pixmap.row_mut(y);
                for x in x0..x1 {
                    let offset = x as usize * 4;
                    row[offset..offset + 4].copy_from_slice(&INK);
                }
            }
            Ok(())
        }
    }

    /// Scripted display host.
    ///
    /// Events are grouped into batches: `wait_event` starts the next batch
    /// and `poll_event` only returns events from the batch in progress.
    pub struct MockBridge {
        geometry: DisplayGeometry,
        buffer: Vec<u8>,
        generation: u64,
        batches: VecDeque<VecDeque<HostEvent>>,
        current: VecDeque<HostEvent>,
        pub resizes: Vec<(u32, u32)>,
        pub frames: usize,
        pub fail_resize: bool,
        /// `signal_frame_ready` fails like a broken pipe
        pub fail_signal: bool,
        /// `pixmap` lends nothing
        pub withhold_pixmap: bool,
    }

    impl MockBridge {
        pub fn new(width: u32, height: u32, density: f32) -> Self {
            let geometry = DisplayGeometry::packed(width, height, density);
            Self {
                buffer: vec![0; geometry.byte_len()],
                geometry,
                generation: 1,
                batches: VecDeque::new(),
                current: VecDeque::new(),
                resizes: Vec::new(),
                frames: 0,
                fail_resize: false,
                fail_signal: false,
                withhold_pixmap: false,
            }
        }

        /// Queues events that become available together.
        pub fn push_batch(&mut self, events: Vec<HostEvent>) {
            self.batches.push_back(events.into());
        }

        /// Raw buffer bytes, as the host would see them.
        pub fn buffer(&self) -> &[u8] {
            &self.buffer
        }

        pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
            let offset = y as usize * self.geometry.stride + x as usize * 4;
            let mut px = [0; 4];
            px.copy_from_slice(&self.buffer[offset..offset + 4]);
            px
        }
    }

    impl DisplayBridge for MockBridge {
        fn geometry(&self) -> DisplayGeometry {
            self.geometry
        }

        fn generation(&self) -> u64 {
            self.generation
        }

        fn resize(&mut self, width: u32, height: u32) -> Result<(), BridgeError> {
            self.resizes.push((width, height));
            if self.fail_resize || width == 0 || height == 0 {
                return Err(BridgeError::InvalidSize { width, height });
            }
            if width == self.geometry.width && height == self.geometry.height {
                return Ok(());
            }

            self.geometry = DisplayGeometry::packed(width, height, self.geometry.density);
            self.buffer = vec![0; self.geometry.byte_len()];
            self.generation += 1;
            Ok(())
        }

        fn pixmap(&mut self) -> Option<HostPixmap<'_>> {
            if self.withhold_pixmap {
                return None;
            }
            HostPixmap::wrap(&mut self.buffer, &self.geometry)
        }

        fn signal_frame_ready(&mut self) -> Result<(), BridgeError> {
            if self.fail_signal {
                return Err(BridgeError::Io(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )));
            }
            self.frames += 1;
            Ok(())
        }

        fn wait_event(&mut self) -> Result<Option<HostEvent>, BridgeError> {
            if let Some(event) = self.current.pop_front() {
                return Ok(Some(event));
            }
            while let Some(batch) = self.batches.pop_front() {
                self.current = batch;
                if let Some(event) = self.current.pop_front() {
                    return Ok(Some(event));
                }
            }
            Ok(None)
        }

        fn poll_event(&mut self) -> Result<Option<HostEvent>, BridgeError> {
            Ok(self.current.pop_front())
        }
    }
}
