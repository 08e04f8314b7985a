/// UBX frame preamble
pub const UBX_SYNC: [u8; 2] = [0xb5, 0x62];

const CLASS_CFG: u8 = 0x06;
const ID_CFG_RATE: u8 = 0x08;
const CLASS_ACK: u8 = 0x05;
const ID_ACK_ACK: u8 = 0x01;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Running 8-bit Fletcher checksum over the class, id, length and payload of a UBX frame
pub struct UbxChecksum(pub u8, pub u8);

impl UbxChecksum {
    /// Start a new checksum
    pub fn new() -> Self {
        Self(0, 0)
    }

    /// Fold one more byte into the checksum
    pub fn next(self, byte: u8) -> Self {
        let Self(a, b) = self;
        let a = a.wrapping_add(byte);
        Self(a, b.wrapping_add(a))
    }

    /// Checksum of a whole byte sequence
    pub fn of(bytes: &[u8]) -> Self {
        bytes.iter().fold(Self::new(), |ck, &b| ck.next(b))
    }
}

impl Default for UbxChecksum {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Time system the receiver aligns its measurements to
pub enum TimeRef {
    /// UTC time
    Utc = 0,
    /// GPS time
    Gps = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Configuration commands sent to the receiver.
///
/// Commands are fire-and-forget; [`UbxCommand::expected_ack`] gives the
/// acknowledgment a receiver would answer with.
pub enum UbxCommand {
    /// UBX-CFG-RATE: navigation solution rate
    CfgRate {
        /// Time between measurements in milliseconds
        measurement_period_ms: u16,
        /// Measurement cycles per navigation solution
        navigation_rate: u16,
        /// Time reference
        time_ref: TimeRef,
    },
}

impl UbxCommand {
    /// Ask for a 10 Hz (100 ms) fix output rate
    pub fn rate_10hz() -> Self {
        Self::rate_hz(10)
    }

    /// Ask for a fix output rate in Hz. Rates are clamped to 1..=1000.
    pub fn rate_hz(hz: u16) -> Self {
        Self::CfgRate {
            measurement_period_ms: 1000 / hz.clamp(1, 1000),
            navigation_rate: 1,
            time_ref: TimeRef::Gps,
        }
    }

    /// Message class
    pub fn class(&self) -> u8 {
        match self {
            Self::CfgRate { .. } => CLASS_CFG,
        }
    }

    /// Message id within the class
    pub fn id(&self) -> u8 {
        match self {
            Self::CfgRate { .. } => ID_CFG_RATE,
        }
    }

    /// Little-endian payload bytes
    pub fn payload(&self) -> Vec<u8> {
        match *self {
            Self::CfgRate {
                measurement_period_ms,
                navigation_rate,
                time_ref,
            } => {
                let mut payload = Vec::with_capacity(6);
                payload.extend(measurement_period_ms.to_le_bytes());
                payload.extend(navigation_rate.to_le_bytes());
                payload.extend((time_ref as u16).to_le_bytes());
                payload
            }
        }
    }

    /// Complete frame, ready to be written to the receiver
    pub fn frame(&self) -> Vec<u8> {
        frame(self.class(), self.id(), &self.payload())
    }

    /// UBX-ACK-ACK frame acknowledging this command
    pub fn expected_ack(&self) -> Vec<u8> {
        frame(CLASS_ACK, ID_ACK_ACK, &[self.class(), self.id()])
    }
}

fn frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend(UBX_SYNC);
    buf.push(class);
    buf.push(id);
    buf.extend((payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    let UbxChecksum(a, b) = UbxChecksum::of(&buf[UBX_SYNC.len()..]);
    buf.push(a);
    buf.push(b);
    buf
}
