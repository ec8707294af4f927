//! Built-in device profiles
//!
//! Rows pick a profile with their `devicetype` tag. Lookup is
//! case-insensitive; a `<name> landscape` tag rotates the named profile.
//! Unknown or empty tags fall back to the desktop profile.

use serde::Serialize;
use tracing::{info, warn};

use rowpilot_common::Viewport;

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const IOS_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";
const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU iPad OS 14_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1";
const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 13) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
const ANDROID_TABLET_UA: &str = "Mozilla/5.0 (Linux; Android 12; SM-T835) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

struct ProfileEntry {
    name: &'static str,
    width: u32,
    height: u32,
    scale: f64,
    mobile: bool,
    user_agent: &'static str,
}

const fn entry(
    name: &'static str,
    width: u32,
    height: u32,
    scale: f64,
    user_agent: &'static str,
) -> ProfileEntry {
    ProfileEntry {
        name,
        width,
        height,
        scale,
        mobile: true,
        user_agent,
    }
}

const DESKTOP: ProfileEntry = ProfileEntry {
    name: "desktop chrome",
    width: 1280,
    height: 720,
    scale: 1.0,
    mobile: false,
    user_agent: DESKTOP_UA,
};

const PROFILES: &[ProfileEntry] = &[
    DESKTOP,
    ProfileEntry {
        name: "desktop hd",
        width: 1920,
        height: 1080,
        scale: 1.0,
        mobile: false,
        user_agent: DESKTOP_UA,
    },
    entry("iphone se", 320, 568, 2.0, IOS_UA),
    entry("iphone 8", 375, 667, 2.0, IOS_UA),
    entry("iphone x", 375, 812, 3.0, IOS_UA),
    entry("iphone 11", 414, 715, 2.0, IOS_UA),
    entry("iphone 12", 390, 664, 3.0, IOS_UA),
    entry("iphone 13", 390, 664, 3.0, IOS_UA),
    entry("iphone 14", 390, 664, 3.0, IOS_UA),
    entry("iphone 14 pro max", 430, 740, 3.0, IOS_UA),
    entry("iphone 15", 393, 659, 3.0, IOS_UA),
    entry("iphone 15 pro max", 430, 739, 3.0, IOS_UA),
    entry("ipad mini", 768, 1024, 2.0, IPAD_UA),
    entry("ipad pro", 768, 1024, 2.0, IPAD_UA),
    entry("ipad pro 11", 834, 1194, 2.0, IPAD_UA),
    entry("pixel 5", 393, 727, 2.75, ANDROID_UA),
    entry("pixel 7", 412, 839, 2.625, ANDROID_UA),
    entry("galaxy s8", 360, 740, 3.0, ANDROID_UA),
    entry("galaxy s9+", 320, 658, 4.5, ANDROID_UA),
    entry("galaxy s24", 360, 780, 3.0, ANDROID_UA),
    entry("galaxy tab s4", 712, 1138, 2.25, ANDROID_TABLET_UA),
];

/// Resolved emulation settings for one row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProfile {
    pub name: String,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
    pub user_agent: String,
}

impl DeviceProfile {
    fn from_entry(entry: &ProfileEntry, landscape: bool) -> Self {
        let (width, height) = if landscape {
            (entry.height, entry.width)
        } else {
            (entry.width, entry.height)
        };
        Self {
            name: if landscape {
                format!("{} landscape", entry.name)
            } else {
                entry.name.to_string()
            },
            viewport: Viewport { width, height },
            device_scale_factor: entry.scale,
            is_mobile: entry.mobile,
            has_touch: entry.mobile,
            user_agent: entry.user_agent.to_string(),
        }
    }

    pub fn desktop() -> Self {
        Self::from_entry(&DESKTOP, false)
    }

    /// Look up a device tag, falling back to the desktop profile
    pub fn resolve(tag: Option<&str>) -> Self {
        let tag = tag.map(|t| t.trim().to_lowercase()).unwrap_or_default();

        let profile = if tag.is_empty() {
            info!("📵 No device type specified, defaulting to 'Desktop Chrome'");
            Self::desktop()
        } else {
            match lookup(&tag) {
                Some(profile) => profile,
                None => {
                    warn!("📵 Unknown device type '{}', defaulting to 'Desktop Chrome'", tag);
                    Self::desktop()
                }
            }
        };

        info!(
            "📃 Resolved device profile: {} {}x{} @{}x",
            profile.name, profile.viewport.width, profile.viewport.height, profile.device_scale_factor
        );
        profile
    }
}

fn lookup(tag: &str) -> Option<DeviceProfile> {
    let (base, landscape) = match tag.strip_suffix(" landscape") {
        Some(base) => (base.trim_end(), true),
        None => (tag, false),
    };
    PROFILES
        .iter()
        .find(|entry| entry.name == base)
        .map(|entry| DeviceProfile::from_entry(entry, landscape))
}

/// Names of all built-in profiles
pub fn profile_names() -> impl Iterator<Item = &'static str> {
    PROFILES.iter().map(|entry| entry.name)
}

/// Every built-in profile in portrait orientation
pub fn builtin_profiles() -> Vec<DeviceProfile> {
    PROFILES
        .iter()
        .map(|entry| DeviceProfile::from_entry(entry, false))
        .collect()
}
