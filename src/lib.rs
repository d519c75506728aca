#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # kms-planner: hardware plane assignment for KMS outputs
//!
//! This crate decides, for every repaint cycle of an output, which views can be scanned
//! out directly by the display controller's hardware planes and which have to be
//! composited by the renderer.
//!
//! ## Structure of the crate
//!
//! - [`backend::drm`] describes the planes of a device, the framebuffers shown on them and
//!   the per-output state proposed for the next refresh.
//! - [`backend::drm::compositor`] contains the [`OutputPlanner`](backend::drm::compositor::OutputPlanner),
//!   walking the views of an output front to back and escalating from planes-only over
//!   mixed to renderer-only composition until a state is accepted.
//! - [`backend::allocator`] re-exports the fourcc and modifier types and contains the
//!   allocation traits used for cursor shadow buffers.
//! - [`output`] and [`utils`] provide the output description and geometry helpers.
//!
//! Views, framebuffer import and the kernel test commit are provided by the caller through
//! the [`View`](backend::drm::compositor::View),
//! [`FramebufferImporter`](backend::drm::compositor::FramebufferImporter) and
//! [`TestOracle`](backend::drm::TestOracle) traits. With the `backend_drm` feature enabled,
//! [`AtomicOracle`](backend::drm::atomic::AtomicOracle) tests states on a real drm device.
//!
//! ### Logging
//!
//! kms-planner makes extensive use of [`tracing`] for its internal logging. Every decision
//! taken for a view is reported at the `trace` level, changes of the composition mode at
//! the `debug` level.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```

pub mod backend;
pub mod output;
pub mod utils;
