//! LOGIN7 request encoding (packet type 0x10).
//!
//! LOGIN7 is a fixed 94-byte header followed by offset/length-addressed
//! UTF-16LE fields. The password is obfuscated with the MS-TDS nibble-swap
//! and XOR; that is obfuscation only, which is why login happens under the
//! TLS established during PRELOGIN.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_utf16;

/// TDS protocol version 7.4 as announced in LOGIN7 and PRELOGIN.
pub const TDS_V7_4: u32 = 0x7400_0004;

/// Fixed LOGIN7 header size.
pub const LOGIN7_HEADER_SIZE: usize = 94;

/// A LOGIN7 request with SQL authentication.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// Requested TDS version.
    pub tds_version: u32,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client program version.
    pub client_prog_version: u32,
    /// Client process id.
    pub client_pid: u32,
    /// Client timezone offset in minutes.
    pub client_timezone: i32,
    /// Client locale id.
    pub client_lcid: u32,
    /// Client machine name.
    pub hostname: String,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Application name reported to the server.
    pub app_name: String,
    /// Server name as dialed.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Initial language, empty for the server default.
    pub language: String,
    /// Initial database, empty for the login default.
    pub database: String,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TDS_V7_4,
            packet_size: 4096,
            client_prog_version: 0,
            client_pid: std::process::id(),
            client_timezone: 0,
            client_lcid: 0x0409,
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::from("mssql-reactive"),
            server_name: String::new(),
            library_name: String::from("mssql-reactive"),
            language: String::new(),
            database: String::new(),
        }
    }
}

impl Login7 {
    /// A login request for the given credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Set the initial database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the client machine name.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: u32) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Encode the LOGIN7 payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        fn push_field(
            text: &str,
            obfuscate: bool,
            var_data: &mut BytesMut,
            offset: &mut u16,
        ) -> (u16, u16) {
            let start = *offset;
            let len = text.encode_utf16().count() as u16;
            if obfuscate {
                write_obfuscated_password(var_data, text);
            } else {
                write_utf16(var_data, text);
            }
            *offset += len * 2;
            (start, len)
        }

        let mut offset = LOGIN7_HEADER_SIZE as u16;
        let mut var_data = BytesMut::new();

        let hostname = push_field(&self.hostname, false, &mut var_data, &mut offset);
        let username = push_field(&self.username, false, &mut var_data, &mut offset);
        let password = push_field(&self.password, true, &mut var_data, &mut offset);
        let app_name = push_field(&self.app_name, false, &mut var_data, &mut offset);
        let server_name = push_field(&self.server_name, false, &mut var_data, &mut offset);
        let unused = (offset, 0u16);
        let library_name = push_field(&self.library_name, false, &mut var_data, &mut offset);
        let language = push_field(&self.language, false, &mut var_data, &mut offset);
        let database = push_field(&self.database, false, &mut var_data, &mut offset);
        let sspi = (offset, 0u16);
        let attach_db = (offset, 0u16);
        let new_password = (offset, 0u16);

        let mut buf = BytesMut::with_capacity(LOGIN7_HEADER_SIZE + var_data.len());
        buf.put_u32_le((LOGIN7_HEADER_SIZE + var_data.len()) as u32);
        buf.put_u32_le(self.tds_version);
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(self.client_prog_version);
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(0); // connection id

        // Option flags 1: fUseDB, fDatabase fatal.
        buf.put_u8(0x60);
        // Option flags 2: fLanguage fatal, ODBC.
        buf.put_u8(0x03);
        // Type flags: default SQL.
        buf.put_u8(0x00);
        // Option flags 3: unknown collation handling.
        buf.put_u8(0x08);

        buf.put_i32_le(self.client_timezone);
        buf.put_u32_le(self.client_lcid);

        for (start, len) in [
            hostname,
            username,
            password,
            app_name,
            server_name,
            unused,
            library_name,
            language,
            database,
        ] {
            buf.put_u16_le(start);
            buf.put_u16_le(len);
        }

        // Client id (MAC address placeholder).
        buf.put_slice(&[0u8; 6]);

        for (start, len) in [sspi, attach_db, new_password] {
            buf.put_u16_le(start);
            buf.put_u16_le(len);
        }

        // SSPI long length.
        buf.put_u32_le(0);

        buf.put_slice(&var_data);
        buf.freeze()
    }
}

/// Obfuscate a password per MS-TDS: swap each byte's nibbles, then XOR 0xA5.
fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for unit in password.encode_utf16() {
        let low = (unit & 0xFF) as u8;
        let high = (unit >> 8) as u8;
        dst.put_u8(low.rotate_right(4) ^ 0xA5);
        dst.put_u8(high.rotate_right(4) ^ 0xA5);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let login = Login7::new("sa", "secret").with_database("master");
        let encoded = login.encode();

        assert!(encoded.len() >= LOGIN7_HEADER_SIZE);

        let total = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(total as usize, encoded.len());

        let version = u32::from_le_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(version, TDS_V7_4);
    }

    #[test]
    fn password_obfuscation() {
        let mut buf = BytesMut::new();
        write_obfuscated_password(&mut buf, "a");

        // 'a' = 0x0061: low 0x61 -> nibble swap 0x16 -> XOR 0xA5 = 0xB3,
        // high 0x00 -> 0x00 -> 0xA5.
        assert_eq!(&buf[..], &[0xB3, 0xA5]);
    }

    #[test]
    fn hostname_field_is_addressed() {
        let login = Login7::new("user", "pw").with_hostname("BOX");
        let encoded = login.encode();

        // First offset/length pair sits right after the fixed scalars.
        let off = u16::from_le_bytes([encoded[36], encoded[37]]) as usize;
        let len = u16::from_le_bytes([encoded[38], encoded[39]]) as usize;
        assert_eq!(off, LOGIN7_HEADER_SIZE);
        assert_eq!(len, 3);
        assert_eq!(&encoded[off..off + 2], &[b'B', 0]);
    }
}
