// Export modules for use in tests
pub mod bridge;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event_source;
pub mod geometry;
pub mod panic_handler;
pub mod pipeline;
pub mod pixmap;
pub mod session;
pub mod settings;
pub mod target;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bridge::{DisplayBridge, HostEvent, KittyBridge};
pub use dispatcher::{Dirty, DispatchStats, EventDispatcher};
pub use engine::Engine;
pub use error::{BridgeError, EngineError, PagerError};
pub use geometry::{DisplayGeometry, FitMode};
pub use session::DocumentSession;
pub use settings::Settings;
