use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
}

impl QueueFamily {
    pub fn new(
        index: u32,
        properties: vk::QueueFamilyProperties,
    ) -> Self {
        Self {
            index,
            properties,
        }
    }

    /// Draw and cull work share one queue, so it must take both
    pub fn supports_graphics_and_compute(&self) -> bool {
        self.properties
            .queue_flags
            .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> QueueFamily {
        QueueFamily::new(
            0,
            vk::QueueFamilyProperties {
                queue_flags: flags,
                queue_count: 1,
                ..Default::default()
            },
        )
    }

    #[test]
    fn requires_both_graphics_and_compute() {
        assert!(family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
            .supports_graphics_and_compute());
        assert!(!family(vk::QueueFlags::GRAPHICS).supports_graphics_and_compute());
        assert!(!family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER).supports_graphics_and_compute());
    }
}
