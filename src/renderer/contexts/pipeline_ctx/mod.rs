//! Draw batch construction, GPU culling, and the indirect draw it feeds.

pub mod batch;
pub mod draw_cull;

pub use draw_cull::DrawCullPipeline;
