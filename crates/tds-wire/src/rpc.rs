//! RPC request encoding (packet type 0x03).
//!
//! RPC drives stored procedures and, through `sp_executesql`, parameterized
//! queries. Each parameter travels as its name, a status byte, a type
//! descriptor and the value bytes; the descriptor announces the type's
//! maximum length rather than the value's actual length.

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{write_b_varchar, write_us_varchar, write_utf16};
use crate::headers::{AllHeaders, TransactionDescriptor};
use crate::types::TdsDataType;

/// Well-known system procedure ids addressable without a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ProcId {
    /// sp_executesql, the vehicle for parameterized queries.
    ExecuteSql = 0x000A,
    /// sp_prepare.
    Prepare = 0x000B,
    /// sp_execute.
    Execute = 0x000C,
    /// sp_prepexec.
    PrepExec = 0x000D,
    /// sp_unprepare.
    Unprepare = 0x000F,
}

bitflags! {
    /// Status flags of an RPC parameter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamFlags: u8 {
        /// Passed by reference; set for OUT parameters.
        const BY_REF_VALUE = 0x01;
        /// The parameter assumes its default value.
        const DEFAULT_VALUE = 0x08;
    }
}

bitflags! {
    /// Option flags of an RPC request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RpcOptionFlags: u16 {
        /// Recompile the procedure before execution.
        const WITH_RECOMPILE = 0x0001;
        /// Suppress metadata in the response.
        const NO_METADATA = 0x0002;
        /// Reuse metadata from the previous execution.
        const REUSE_METADATA = 0x0004;
    }
}

/// One RPC parameter: name, status and the encoded type descriptor + value.
///
/// The descriptor and value bytes normally come from the column codec layer,
/// which knows the per-type grammar; [`RpcParam::nvarchar`] exists because
/// `sp_executesql` itself needs string parameters for the statement and the
/// declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcParam {
    /// Parameter name including the `@`, or empty for positional.
    pub name: String,
    /// Status flags.
    pub flags: ParamFlags,
    /// The wire data type token.
    pub data_type: TdsDataType,
    /// Descriptor and value bytes following the type token.
    pub body: Bytes,
    /// Formal type for sp_executesql declarations, e.g. `nvarchar(4000)`.
    pub formal_type: String,
}

impl RpcParam {
    /// A parameter from codec-encoded bytes.
    pub fn from_encoded(
        name: impl Into<String>,
        data_type: TdsDataType,
        body: Bytes,
        formal_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            flags: ParamFlags::default(),
            data_type,
            body,
            formal_type: formal_type.into(),
        }
    }

    /// An NVARCHAR parameter.
    pub fn nvarchar(name: impl Into<String>, value: &str) -> Self {
        // Default collation; the server ignores it for Unicode parameters.
        const COLLATION: [u8; 5] = [0x09, 0x04, 0xD0, 0x00, 0x34];

        let char_count = value.encode_utf16().count();
        let byte_count = char_count * 2;
        let mut body = BytesMut::with_capacity(byte_count + 16);

        let formal_type = if char_count > 4000 {
            body.put_u16_le(0xFFFF);
            body.put_slice(&COLLATION);
            body.put_u64_le(byte_count as u64);
            body.put_u32_le(byte_count as u32);
            write_utf16(&mut body, value);
            body.put_u32_le(0);
            "nvarchar(max)".to_string()
        } else {
            let max = (char_count.max(1) * 2) as u16;
            body.put_u16_le(max);
            body.put_slice(&COLLATION);
            body.put_u16_le(byte_count as u16);
            write_utf16(&mut body, value);
            format!("nvarchar({})", char_count.max(1))
        };

        Self {
            name: name.into(),
            flags: ParamFlags::default(),
            data_type: TdsDataType::NVarChar,
            body: body.freeze(),
            formal_type,
        }
    }

    /// Mark this parameter as OUT.
    #[must_use]
    pub fn as_output(mut self) -> Self {
        self.flags |= ParamFlags::BY_REF_VALUE;
        self
    }

    /// Write the parameter.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_b_varchar(dst, &self.name);
        dst.put_u8(self.flags.bits());
        dst.put_u8(self.data_type as u8);
        dst.put_slice(&self.body);
    }
}

/// Procedure addressing of an RPC request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Procedure {
    Named(String),
    Id(ProcId),
}

/// An RPC request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    procedure: Procedure,
    options: RpcOptionFlags,
    params: Vec<RpcParam>,
}

impl RpcRequest {
    /// Call a procedure by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            procedure: Procedure::Named(name.into()),
            options: RpcOptionFlags::default(),
            params: Vec::new(),
        }
    }

    /// Call a well-known system procedure by id.
    #[must_use]
    pub fn by_id(id: ProcId) -> Self {
        Self {
            procedure: Procedure::Id(id),
            options: RpcOptionFlags::default(),
            params: Vec::new(),
        }
    }

    /// A parameterized query through sp_executesql.
    ///
    /// The statement text and the parameter declarations are prepended as
    /// the two leading NVARCHAR parameters, per the procedure's contract.
    #[must_use]
    pub fn execute_sql(sql: &str, params: Vec<RpcParam>) -> Self {
        let mut request = Self::by_id(ProcId::ExecuteSql);
        request.params.push(RpcParam::nvarchar("", sql));

        if !params.is_empty() {
            let declarations = params
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let name = if p.name.is_empty() {
                        format!("@P{}", i + 1)
                    } else {
                        p.name.clone()
                    };
                    format!("{name} {}", p.formal_type)
                })
                .collect::<Vec<_>>()
                .join(",");
            request.params.push(RpcParam::nvarchar("", &declarations));
        }

        request.params.extend(params);
        request
    }

    /// Set option flags.
    #[must_use]
    pub fn with_options(mut self, options: RpcOptionFlags) -> Self {
        self.options = options;
        self
    }

    /// Append a parameter.
    #[must_use]
    pub fn with_param(mut self, param: RpcParam) -> Self {
        self.params.push(param);
        self
    }

    /// The parameters in submission order.
    #[must_use]
    pub fn params(&self) -> &[RpcParam] {
        &self.params
    }

    /// Encode the request payload under the given transaction descriptor.
    #[must_use]
    pub fn encode(&self, descriptor: TransactionDescriptor) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        AllHeaders::transactional(descriptor, 1).encode(&mut buf);

        match &self.procedure {
            Procedure::Named(name) => write_us_varchar(&mut buf, name),
            Procedure::Id(id) => {
                buf.put_u16_le(0xFFFF);
                buf.put_u16_le(*id as u16);
            }
        }

        buf.put_u16_le(self.options.bits());

        for param in &self.params {
            param.encode(&mut buf);
        }

        buf.freeze()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn proc_id_request_layout() {
        let payload = RpcRequest::by_id(ProcId::ExecuteSql).encode(TransactionDescriptor::EMPTY);

        // All-headers, then 0xFFFF + proc id, then zero option flags.
        assert_eq!(payload.len(), 22 + 2 + 2 + 2);
        assert_eq!(&payload[22..24], &[0xFF, 0xFF]);
        assert_eq!(&payload[24..26], &[0x0A, 0x00]);
        assert_eq!(&payload[26..28], &[0x00, 0x00]);
    }

    #[test]
    fn nvarchar_param_encoding() {
        let param = RpcParam::nvarchar("@p1", "ab");

        let mut buf = BytesMut::new();
        param.encode(&mut buf);

        // name: 3 chars UTF-16 behind a 1-byte count.
        assert_eq!(buf[0], 3);
        let after_name = 1 + 6;
        // status byte, then the nvarchar type token.
        assert_eq!(buf[after_name], 0x00);
        assert_eq!(buf[after_name + 1], 0xE7);
        // max length: 2 chars = 4 bytes.
        assert_eq!(&buf[after_name + 2..after_name + 4], &[0x04, 0x00]);
        // 5 bytes of collation, then the value length (4 bytes).
        assert_eq!(&buf[after_name + 9..after_name + 11], &[0x04, 0x00]);
        assert_eq!(param.formal_type, "nvarchar(2)");
    }

    #[test]
    fn execute_sql_prepends_statement_and_declarations() {
        let param = RpcParam::nvarchar("@name", "paluch");
        let request = RpcRequest::execute_sql("SELECT * FROM t WHERE name = @name", vec![param]);

        assert_eq!(request.params().len(), 3);
        assert_eq!(request.params()[0].name, "");
        assert_eq!(request.params()[1].name, "");
        assert_eq!(request.params()[2].name, "@name");
    }

    #[test]
    fn output_param_sets_by_ref() {
        let param = RpcParam::nvarchar("@out", "x").as_output();
        assert!(param.flags.contains(ParamFlags::BY_REF_VALUE));

        let mut buf = BytesMut::new();
        param.encode(&mut buf);
        // name is 4 chars.
        assert_eq!(buf[1 + 8], 0x01);
    }
}
