//! PRELOGIN negotiation (packet type 0x12).
//!
//! PRELOGIN is the first exchange on a fresh connection: an option table
//! where client and server announce versions and agree on encryption before
//! any login data flows. When encryption is agreed, the TLS handshake that
//! follows is itself wrapped in PRELOGIN packets.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Option tokens of the PRELOGIN table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PreLoginOption {
    /// Version and sub-build.
    Version = 0x00,
    /// Encryption negotiation.
    Encryption = 0x01,
    /// Named instance validation.
    Instance = 0x02,
    /// Client thread id, for server-side diagnostics.
    ThreadId = 0x03,
    /// MARS capability.
    Mars = 0x04,
    /// End of the option table.
    Terminator = 0xFF,
}

/// Encryption agreement levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// Encrypt only the login sequence.
    Off = 0x00,
    /// Encrypt the whole session.
    On = 0x01,
    /// Encryption is not available.
    NotSupported = 0x02,
    /// Encryption is required.
    #[default]
    Required = 0x03,
}

impl EncryptionLevel {
    /// Parse an encryption level byte; unknown values degrade to `Off`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            0x03 => Self::Required,
            _ => Self::Off,
        }
    }

    /// Whether the agreement requires a TLS handshake.
    #[must_use]
    pub const fn requires_tls(&self) -> bool {
        matches!(self, Self::On | Self::Required)
    }
}

/// A PRELOGIN message, request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreLogin {
    /// Version field: the TDS version on requests, the server build on
    /// responses.
    pub version: u32,
    /// Sub-build number.
    pub sub_build: u16,
    /// Encryption level announced by this side.
    pub encryption: EncryptionLevel,
    /// Named instance to validate.
    pub instance: Option<String>,
    /// Client thread id.
    pub thread_id: Option<u32>,
    /// MARS offered or accepted.
    pub mars: bool,
}

impl Default for PreLogin {
    fn default() -> Self {
        Self {
            version: 0,
            sub_build: 0,
            encryption: EncryptionLevel::Off,
            instance: None,
            thread_id: None,
            mars: false,
        }
    }
}

impl PreLogin {
    /// A client request announcing the given TDS version and encryption
    /// preference.
    #[must_use]
    pub fn new(version: u32, encryption: EncryptionLevel) -> Self {
        Self {
            version,
            encryption,
            ..Self::default()
        }
    }

    /// Encode the option table and its data section.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // Version, encryption and MARS are always present.
        let mut option_count = 3;
        if self.instance.is_some() {
            option_count += 1;
        }
        if self.thread_id.is_some() {
            option_count += 1;
        }

        let mut table = BytesMut::new();
        let mut data = BytesMut::new();
        // Option entries are 5 bytes each; the terminator is one more.
        let mut offset = (option_count * 5 + 1) as u16;

        table.put_u8(PreLoginOption::Version as u8);
        table.put_u16(offset);
        table.put_u16(6);
        data.put_u32(self.version);
        data.put_u16_le(self.sub_build);
        offset += 6;

        table.put_u8(PreLoginOption::Encryption as u8);
        table.put_u16(offset);
        table.put_u16(1);
        data.put_u8(self.encryption as u8);
        offset += 1;

        if let Some(instance) = &self.instance {
            let len = instance.len() as u16 + 1;
            table.put_u8(PreLoginOption::Instance as u8);
            table.put_u16(offset);
            table.put_u16(len);
            data.put_slice(instance.as_bytes());
            data.put_u8(0);
            offset += len;
        }

        if let Some(thread_id) = self.thread_id {
            table.put_u8(PreLoginOption::ThreadId as u8);
            table.put_u16(offset);
            table.put_u16(4);
            data.put_u32_le(thread_id);
            offset += 4;
        }

        table.put_u8(PreLoginOption::Mars as u8);
        table.put_u16(offset);
        table.put_u16(1);
        data.put_u8(u8::from(self.mars));

        table.put_u8(PreLoginOption::Terminator as u8);
        table.put_slice(&data);
        table.freeze()
    }

    /// Decode a PRELOGIN message from a complete payload.
    ///
    /// Offsets in the option table are absolute within the payload, so the
    /// whole message must be at hand.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut prelogin = Self::default();
        let mut cursor = payload;

        loop {
            if !cursor.has_remaining() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let option = cursor.get_u8();
            if option == PreLoginOption::Terminator as u8 {
                break;
            }

            if cursor.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let offset = cursor.get_u16() as usize;
            let length = cursor.get_u16() as usize;
            if offset + length > payload.len() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let mut value = &payload[offset..offset + length];

            match option {
                0x00 if length >= 6 => {
                    prelogin.version = value.get_u32();
                    prelogin.sub_build = value.get_u16_le();
                }
                0x01 if length >= 1 => {
                    prelogin.encryption = EncryptionLevel::from_u8(value.get_u8());
                }
                0x02 => {
                    let text: Vec<u8> = value.iter().copied().take_while(|&b| b != 0).collect();
                    prelogin.instance = Some(
                        String::from_utf8(text).map_err(|_| ProtocolError::InvalidStringData)?,
                    );
                }
                0x03 if length >= 4 => {
                    prelogin.thread_id = Some(value.get_u32_le());
                }
                0x04 if length >= 1 => {
                    prelogin.mars = value.get_u8() != 0;
                }
                // Unknown options are carried for forward compatibility and
                // ignored here.
                _ => {}
            }
        }

        Ok(prelogin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let prelogin = PreLogin {
            version: 0x7400_0004,
            sub_build: 0,
            encryption: EncryptionLevel::Required,
            instance: None,
            thread_id: Some(77),
            mars: false,
        };

        let encoded = prelogin.encode();
        let decoded = PreLogin::decode(&encoded).unwrap();
        assert_eq!(decoded, prelogin);
    }

    #[test]
    fn encryption_negotiation() {
        assert!(EncryptionLevel::Required.requires_tls());
        assert!(EncryptionLevel::On.requires_tls());
        assert!(!EncryptionLevel::Off.requires_tls());
        assert!(!EncryptionLevel::NotSupported.requires_tls());
    }

    #[test]
    fn decode_rejects_truncated_table() {
        // Option byte with no entry data and no terminator.
        assert!(PreLogin::decode(&[0x01, 0x00]).is_err());
    }

    #[test]
    fn unknown_options_are_ignored() {
        // Hand-built table: encryption entry, one unknown entry, terminator.
        let mut payload = BytesMut::new();
        payload.put_u8(0x01); // encryption
        payload.put_u16(11);
        payload.put_u16(1);
        payload.put_u8(0x09); // unknown option
        payload.put_u16(12);
        payload.put_u16(1);
        payload.put_u8(0xFF); // terminator
        payload.put_u8(0x01); // encryption = On
        payload.put_u8(0x00); // unknown option data

        let decoded = PreLogin::decode(&payload).unwrap();
        assert_eq!(decoded.encryption, EncryptionLevel::On);
    }
}
