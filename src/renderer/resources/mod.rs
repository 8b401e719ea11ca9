/// "Resources" refers to middle-level objects built on top of the "Internals".
/// They are relatively intuitive and managed by the renderer.

pub mod material;
pub mod mesh;
pub mod shader;
pub mod vertex;
