//! Device information attached to every telemetry event.

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Static per-device attributes, collected once per process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: String,
    pub device_name: String,
    pub device_model: String,
    pub os_version: String,
    pub app_version: String,
}

impl DeviceInfo {
    pub fn new(
        device_type: impl Into<String>,
        device_name: impl Into<String>,
        device_model: impl Into<String>,
        os_version: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            device_name: device_name.into(),
            device_model: device_model.into(),
            os_version: os_version.into(),
            app_version: app_version.into(),
        }
    }

    /// Collect a snapshot for the running host
    pub fn collect(app_version: &str) -> Self {
        let device_name = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let os_version = System::long_os_version()
            .or_else(System::os_version)
            .unwrap_or_else(|| "Unknown OS".to_string());

        let device_model = match System::name() {
            Some(name) => format!("{} {}", name, std::env::consts::ARCH),
            None => std::env::consts::ARCH.to_string(),
        };

        Self {
            device_type: device_type().to_string(),
            device_name,
            device_model,
            os_version,
            app_version: app_version.to_string(),
        }
    }
}

fn device_type() -> &'static str {
    match std::env::consts::OS {
        "ios" => "iPhone",
        "android" => "Android",
        "macos" => "Mac",
        "windows" => "Windows PC",
        "linux" => "Linux PC",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_fills_every_field() {
        let info = DeviceInfo::collect("1.2.3");
        assert_eq!(info.app_version, "1.2.3");
        assert!(!info.device_type.is_empty());
        assert!(!info.device_name.is_empty());
        assert!(!info.device_model.is_empty());
        assert!(!info.os_version.is_empty());
    }
}
