/// "Internals" refers to low-level objects that are used to implement the "Resources" and "Contexts" objects.

pub mod buffer;
pub mod descriptor_set_layout_builder;
pub mod image;
pub mod swapchain;
