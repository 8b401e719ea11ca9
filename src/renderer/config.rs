use std::time::Duration;
use ash::vk;

/// Contains configuration options for the renderer like the window size, present modes, and other settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub window_title: String,
    pub window_size: (u32, u32),

    /// Present modes in order of preference. Swapchain creation fails if none is supported.
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Upper bound on multisampling. The device picks the highest supported count up to this.
    pub max_msaa_samples: u32,
    pub frustum_culling: bool,
    pub clear_color: [f32; 4],

    /// Upper bound on the wait for a frame slot to become free.
    pub acquire_timeout: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_title: "instancer".to_owned(),
            window_size: (1280, 720),
            present_modes: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
            max_msaa_samples: 8,
            frustum_culling: true,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl RenderConfig {
    pub const VSYNC_ENV: &'static str = "INSTANCER_VSYNC";
    pub const MSAA_ENV: &'static str = "INSTANCER_MSAA";
    pub const CULLING_ENV: &'static str = "INSTANCER_CULLING";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(vsync) = lookup(Self::VSYNC_ENV).and_then(|v| parse_flag(&v)) {
            config = config.with_vsync(vsync);
        }
        if let Some(samples) = lookup(Self::MSAA_ENV).and_then(|v| parse_sample_count(&v)) {
            config.max_msaa_samples = samples;
        }
        if let Some(culling) = lookup(Self::CULLING_ENV).and_then(|v| parse_flag(&v)) {
            config.frustum_culling = culling;
        }

        config
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.present_modes = if vsync {
            vec![vk::PresentModeKHR::FIFO]
        } else {
            vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        };
        self
    }

    pub fn acquire_timeout_ns(&self) -> u64 {
        u64::try_from(self.acquire_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        other => {
            log::warn!("Ignoring unrecognised flag value {:?}", other);
            None
        }
    }
}

fn parse_sample_count(value: &str) -> Option<u32> {
    match value.trim().parse::<u32>() {
        Ok(samples) if samples.is_power_of_two() && samples <= 64 => Some(samples),
        _ => {
            log::warn!("Ignoring invalid sample count {:?}", value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> RenderConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RenderConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn default_prefers_mailbox_then_fifo() {
        let config = RenderConfig::default();
        assert_eq!(
            config.present_modes,
            vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO]
        );
        assert!(config.frustum_culling);
        assert_eq!(config.acquire_timeout_ns(), 5_000_000_000);
    }

    #[test]
    fn vsync_env_restricts_to_fifo() {
        let config = config_from(&[(RenderConfig::VSYNC_ENV, "1")]);
        assert_eq!(config.present_modes, vec![vk::PresentModeKHR::FIFO]);
    }

    #[test]
    fn flags_parse_case_insensitively() {
        let config = config_from(&[
            (RenderConfig::VSYNC_ENV, "OFF"),
            (RenderConfig::CULLING_ENV, "False"),
        ]);
        assert_eq!(
            config.present_modes,
            vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        );
        assert!(!config.frustum_culling);
    }

    #[test]
    fn msaa_env_caps_sample_count() {
        assert_eq!(config_from(&[(RenderConfig::MSAA_ENV, "4")]).max_msaa_samples, 4);
        assert_eq!(config_from(&[(RenderConfig::MSAA_ENV, "3")]).max_msaa_samples, 8);
        assert_eq!(config_from(&[(RenderConfig::MSAA_ENV, "x")]).max_msaa_samples, 8);
    }

    #[test]
    fn unknown_values_keep_defaults() {
        let config = config_from(&[(RenderConfig::CULLING_ENV, "maybe")]);
        assert!(config.frustum_culling);
    }
}
