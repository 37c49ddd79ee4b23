//! Capability registry advertised to the agent.
//!
//! Capabilities form an unbounded bit-set: every optional protocol feature has
//! a stable bit index and new features keep appending bits, so the mask is
//! backed by an arbitrary-precision integer rather than a machine word. The
//! agent expects the minimal big-endian byte representation, base64-encoded.

use base64::Engine;
use num_bigint::BigUint;

/// Known capability bits.
///
/// The registry accepts any index through [`Capabilities::set_capability`];
/// this enum only names the bits this crate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Capability {
    AsmActivation = 1,
    AsmIpBlocking = 2,
    AsmDdRules = 3,
    AsmExclusions = 4,
    AsmRequestBlocking = 5,
    AsmResponseBlocking = 6,
    AsmUserBlocking = 7,
    AsmCustomRules = 8,
    AsmCustomBlockingResponse = 9,
    AsmTrustedIps = 10,
    AsmApiSecuritySampleRate = 11,
    ApmTracingSampleRate = 12,
    ApmTracingLogsInjection = 13,
    ApmTracingHttpHeaderTags = 14,
    ApmTracingCustomTags = 15,
    AsmProcessorOverrides = 16,
    AsmCustomDataScanners = 17,
    AsmExclusionData = 18,
    ApmTracingEnabled = 19,
    ApmTracingDataStreamsEnabled = 20,
    AsmRaspSqli = 21,
    AsmRaspLfi = 22,
    AsmRaspSsrf = 23,
    AsmRaspShi = 24,
    AsmRaspXxe = 25,
    AsmRaspRce = 26,
    AsmRaspNosqli = 27,
    AsmRaspXss = 28,
    ApmTracingSampleRules = 29,
    CsmActivation = 30,
    AsmAutoUserInstrumMode = 31,
    AsmEndpointFingerprint = 32,
    AsmSessionFingerprint = 33,
    AsmNetworkFingerprint = 34,
    AsmHeaderFingerprint = 35,
    AsmTruncationRules = 36,
    AsmRaspCmdi = 37,
    ApmTracingEnableDynamicInstrumentation = 38,
    ApmTracingEnableExceptionReplay = 39,
    ApmTracingEnableCodeOrigin = 40,
    ApmTracingEnableLiveDebugging = 41,
    AsmDdMulticonfig = 42,
    AsmTraceTaggingRules = 43,
    AsmExtendedDataCollection = 44,
    ApmTracingMulticonfig = 45,
    FfeFlagConfigurationRules = 46,
}

impl Capability {
    /// Bit index of the capability inside the mask.
    pub const fn bit(self) -> u64 {
        self as u64
    }
}

/// Unbounded capability bit-set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    mask: BigUint,
}

impl Capabilities {
    /// Creates an empty registry (encodes as a single zero byte).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears exactly one bit, growing the mask when needed.
    pub fn set_capability(&mut self, bit: u64, enabled: bool) {
        self.mask.set_bit(bit, enabled);
    }

    /// Convenience wrapper around [`Capabilities::set_capability`] for named bits.
    pub fn update(&mut self, capability: Capability, enabled: bool) {
        self.set_capability(capability.bit(), enabled);
    }

    /// Returns whether the bit at `bit` is set.
    pub fn is_set(&self, bit: u64) -> bool {
        self.mask.bit(bit)
    }

    /// Minimal big-endian representation; zero is a single `0x00` byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.mask.to_bytes_be()
    }

    /// Wire encoding: base64 of [`Capabilities::to_bytes`].
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Parses a previously encoded capability field.
    pub fn decode(encoded: &str) -> Result<Self, base64::DecodeError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes())?;
        Ok(Self {
            mask: BigUint::from_bytes_be(&bytes),
        })
    }
}
