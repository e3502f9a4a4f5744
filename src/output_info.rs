use std::fmt;

/// Public description of one display, as reported by the compositor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputInfo {
    /// Connector name such as `DP-1`, or the model when the compositor
    /// does not advertise names.
    pub name: String,
    /// Width in physical pixels.
    pub width: u32,
    /// Height in physical pixels.
    pub height: u32,
    pub refresh_rate_hz: u32,
    pub scale: i32,
}

impl fmt::Display for OutputInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}@{}Hz, scale={})",
            self.name, self.width, self.height, self.refresh_rate_hz, self.scale
        )
    }
}
