//! Instance, device, queue, and presentation target.
//!
//! Drop order matters here: every buffer and image must be gone before the
//! [`device::RenderDevice`], and the device before the [`instance::RenderInstance`].

pub mod instance;
pub mod device;
pub mod queue;
pub mod target;
pub mod transfer_ctx;
