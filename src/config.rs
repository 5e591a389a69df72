//! # Channel Configuration
//!
//! Configuration for a per-ONU OMCI control channel.
//!
//! For most deployments the defaults work out of the box:
//!
//! ```
//! use omci_cc::ChannelConfig;
//!
//! let config = ChannelConfig::default();
//! assert!(config.repair_baseline_trailer);
//! ```
//!
//! For custom configurations, use the builder:
//!
//! ```
//! use omci_cc::ChannelConfig;
//! use std::time::Duration;
//!
//! let config = ChannelConfig::builder()
//!     .default_timeout(Duration::from_secs(3))
//!     .repair_baseline_trailer(false) // ingress may carry extended frames
//!     .build();
//! ```
//!
//! ## Configuration Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `default_timeout` | 10 s | Per-request timeout stamped on transfer descriptors |
//! | `repair_baseline_trailer` | true | Rewrite a bad baseline trailer length on ingress |
//! | `support_extended_messages` | false | Extended OMCI message set negotiated with the ONU |

use std::time::Duration;

/// Default per-request OMCI timeout.
pub const DEFAULT_OMCI_TIMEOUT: Duration = Duration::from_secs(10);

/// Control-channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Timeout stamped on each outbound transfer descriptor.
    ///
    /// The channel itself does not enforce it; the transport and the owning
    /// FSM honor it.
    pub default_timeout: Duration,
    /// Overwrite the CPCS-SDU length field of an ingress baseline frame when
    /// it is not 40.
    ///
    /// Known workaround for an upstream bug in baseline frames. An
    /// extended-format frame would be corrupted by the rewrite, so disable
    /// this when extended ingress is possible.
    pub repair_baseline_trailer: bool,
    /// Whether the ONU negotiated the extended OMCI message set.
    pub support_extended_messages: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_OMCI_TIMEOUT,
            repair_baseline_trailer: true,
            support_extended_messages: false,
        }
    }
}

impl ChannelConfig {
    /// Create a new builder
    pub fn builder() -> ChannelConfigBuilder {
        ChannelConfigBuilder::default()
    }
}

/// Builder for [`ChannelConfig`]
#[derive(Default)]
pub struct ChannelConfigBuilder {
    config: ChannelConfig,
}

impl ChannelConfigBuilder {
    /// Set the default per-request timeout
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Enable or disable the baseline trailer rewrite on ingress
    pub fn repair_baseline_trailer(mut self, enabled: bool) -> Self {
        self.config.repair_baseline_trailer = enabled;
        self
    }

    /// Declare extended OMCI message-set support
    pub fn support_extended_messages(mut self, enabled: bool) -> Self {
        self.config.support_extended_messages = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ChannelConfig {
        self.config
    }
}
