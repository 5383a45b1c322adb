//! TDS token stream definitions.
//!
//! A tabular response is a stream of self-describing tokens: column
//! metadata, rows, environment changes, server messages and completion
//! markers. Each token starts with a one-byte type identifier; readers
//! consume exactly the token's bytes and writers produce the same bytes
//! (the writers exist for the scripted-server tests that sit on the other
//! end of a connection).

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{
    read_b_varbyte, read_b_varchar, read_plp, read_us_varchar, write_b_varbyte, write_b_varchar,
    write_plp, write_us_varchar,
};
use crate::collation::Collation;
use crate::error::ProtocolError;
use crate::types::{Length, LengthStrategy, SqlServerType, TypeInformation};

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Return status of an RPC (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Ordering columns (ORDER).
    Order = 0xA9,
    /// Server error message (ERROR).
    Error = 0xAA,
    /// Server informational message (INFO).
    Info = 0xAB,
    /// Login acknowledgement (LOGINACK).
    LoginAck = 0xAD,
    /// Feature extension acknowledgement (FEATUREEXTACK).
    FeatureExtAck = 0xAE,
    /// Row data (ROW).
    Row = 0xD1,
    /// Row data with null bitmap (NBCROW).
    NbcRow = 0xD2,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// Completion of a SQL statement (DONE).
    Done = 0xFD,
    /// Completion of a stored procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Completion of a statement inside a procedure (DONEINPROC).
    DoneInProc = 0xFF,
}

impl TokenType {
    /// Parse a token type byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x79 => Ok(Self::ReturnStatus),
            0x81 => Ok(Self::ColMetaData),
            0xA9 => Ok(Self::Order),
            0xAA => Ok(Self::Error),
            0xAB => Ok(Self::Info),
            0xAD => Ok(Self::LoginAck),
            0xAE => Ok(Self::FeatureExtAck),
            0xD1 => Ok(Self::Row),
            0xD2 => Ok(Self::NbcRow),
            0xE3 => Ok(Self::EnvChange),
            0xFD => Ok(Self::Done),
            0xFE => Ok(Self::DoneProc),
            0xFF => Ok(Self::DoneInProc),
            other => Err(ProtocolError::InvalidTokenType(other)),
        }
    }
}

/// A parsed token of a tabular response.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Result set schema; supersedes any previous schema.
    ColumnMetadata(ColumnMetadata),
    /// One row of values under the current schema.
    Row(RowToken),
    /// One row with a null bitmap under the current schema.
    NbcRow(RowToken),
    /// Completion of a SQL statement.
    Done(DoneToken),
    /// Completion of a stored procedure.
    DoneProc(DoneToken),
    /// Completion of a statement inside a stored procedure.
    DoneInProc(DoneToken),
    /// Server error message.
    Error(MessageToken),
    /// Server informational message.
    Info(MessageToken),
    /// Session environment change.
    EnvChange(EnvChangeToken),
    /// Feature negotiation acknowledgement.
    FeatureExtAck(FeatureExtAckToken),
    /// Login acknowledgement.
    LoginAck(LoginAckToken),
    /// RPC return status.
    ReturnStatus(i32),
    /// Ordering columns of the result set.
    Order(OrderToken),
}

impl Token {
    /// Whether this token terminates a response: a DONE (not DONEPROC or
    /// DONEINPROC) with the MORE bit clear.
    #[must_use]
    pub fn is_final_done(&self) -> bool {
        matches!(self, Self::Done(done) if done.is_final())
    }

    /// Encode the token, including its type byte.
    ///
    /// `Row`/`NbcRow` need the schema to pick length prefixes, so they are
    /// encoded through [`RowToken::encode`] instead and this panics in debug
    /// builds if asked.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::ColumnMetadata(meta) => meta.encode(dst),
            Self::Done(done) => done.encode(TokenType::Done, dst),
            Self::DoneProc(done) => done.encode(TokenType::DoneProc, dst),
            Self::DoneInProc(done) => done.encode(TokenType::DoneInProc, dst),
            Self::Error(msg) => msg.encode(TokenType::Error, dst),
            Self::Info(msg) => msg.encode(TokenType::Info, dst),
            Self::EnvChange(env) => env.encode(dst),
            Self::FeatureExtAck(ack) => ack.encode(dst),
            Self::LoginAck(ack) => ack.encode(dst),
            Self::ReturnStatus(status) => {
                dst.put_u8(TokenType::ReturnStatus as u8);
                dst.put_i32_le(*status);
            }
            Self::Order(order) => order.encode(dst),
            Self::Row(_) | Self::NbcRow(_) => {
                debug_assert!(false, "row tokens are encoded with their schema");
            }
        }
    }
}

/// One column of a result set schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Zero-based position in the row.
    pub index: usize,
    /// Column name, possibly empty for computed columns.
    pub name: String,
    /// Type description.
    pub type_info: TypeInformation,
    /// Owning table for legacy LOB columns.
    pub table_name: Option<String>,
}

/// COLMETADATA: the schema rows are decoded against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMetadata {
    /// Ordered column descriptions.
    pub columns: Vec<Column>,
}

impl ColumnMetadata {
    /// Column count announcing "no metadata" (RPC-only responses).
    pub const NO_METADATA: u16 = 0xFFFF;

    /// Decode the token body (type byte already consumed).
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let count = src.get_u16_le();
        if count == Self::NO_METADATA {
            return Ok(Self::default());
        }

        let mut columns = Vec::with_capacity(count as usize);
        for index in 0..count as usize {
            let type_info = TypeInformation::decode(src, true)?;

            // Legacy LOB columns carry the owning table name between the
            // type descriptor and the column name.
            let table_name = match type_info.server_type() {
                SqlServerType::Text | SqlServerType::NText | SqlServerType::Image => {
                    Some(Self::decode_table_name(src)?)
                }
                _ => None,
            };

            let name = read_b_varchar(src)?;
            columns.push(Column {
                index,
                name,
                type_info,
                table_name,
            });
        }

        Ok(Self { columns })
    }

    fn decode_table_name(src: &mut impl Buf) -> Result<String, ProtocolError> {
        if src.remaining() < 1 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let parts = src.get_u8();
        let mut name = String::new();
        for i in 0..parts {
            if i > 0 {
                name.push('.');
            }
            name.push_str(&read_us_varchar(src)?);
        }
        Ok(name)
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::ColMetaData as u8);
        if self.columns.is_empty() {
            dst.put_u16_le(Self::NO_METADATA);
            return;
        }

        dst.put_u16_le(self.columns.len() as u16);
        for column in &self.columns {
            dst.put_u32_le(0); // user type
            dst.put_u16_le(column.type_info.flags());
            column.type_info.encode(dst);
            if let Some(table_name) = &column.table_name {
                dst.put_u8(1);
                write_us_varchar(dst, table_name);
            } else if matches!(
                column.type_info.server_type(),
                SqlServerType::Text | SqlServerType::NText | SqlServerType::Image
            ) {
                dst.put_u8(0);
            }
            write_b_varchar(dst, &column.name);
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Whether this is the "no metadata" marker.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One column value inside a row: its parsed length and raw bytes.
///
/// Values stay undecoded until a column codec is asked for them; PLP values
/// hold their chunks already concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct RowValue {
    /// Parsed length; `Null` means no data bytes.
    pub length: Length,
    /// The raw value bytes.
    pub data: Bytes,
}

impl RowValue {
    /// A NULL value.
    #[must_use]
    pub fn null() -> Self {
        Self {
            length: Length::Null,
            data: Bytes::new(),
        }
    }

    /// A value with known content.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self {
            length: Length::Known(data.len() as u32),
            data,
        }
    }

    /// Whether the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.length.is_null()
    }
}

/// ROW / NBCROW: values aligned with the current column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RowToken {
    /// One entry per column, in schema order.
    pub values: Vec<RowValue>,
}

impl RowToken {
    /// Decode a ROW token body against the current schema.
    pub fn decode(src: &mut impl Buf, metadata: &ColumnMetadata) -> Result<Self, ProtocolError> {
        let mut values = Vec::with_capacity(metadata.columns.len());
        for column in &metadata.columns {
            values.push(Self::decode_value(src, &column.type_info)?);
        }
        Ok(Self { values })
    }

    /// Decode an NBCROW token body: a LSB-first null bitmap followed by the
    /// values of the non-null columns only.
    pub fn decode_nbc(
        src: &mut impl Buf,
        metadata: &ColumnMetadata,
    ) -> Result<Self, ProtocolError> {
        let count = metadata.columns.len();
        let bitmap_len = count.div_ceil(8);
        if src.remaining() < bitmap_len {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut bitmap = vec![0u8; bitmap_len];
        for byte in &mut bitmap {
            *byte = src.get_u8();
        }

        let mut values = Vec::with_capacity(count);
        for (i, column) in metadata.columns.iter().enumerate() {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            if is_null {
                values.push(RowValue::null());
            } else {
                values.push(Self::decode_value(src, &column.type_info)?);
            }
        }

        Ok(Self { values })
    }

    fn decode_value(src: &mut impl Buf, ty: &TypeInformation) -> Result<RowValue, ProtocolError> {
        if ty.length_strategy() == LengthStrategy::PartLen {
            return Ok(match read_plp(src)? {
                Some(data) => RowValue::new(data),
                None => RowValue::null(),
            });
        }

        match Length::decode(src, ty)? {
            Length::Null => Ok(RowValue::null()),
            Length::Known(len) => {
                let len = len as usize;
                if src.remaining() < len {
                    return Err(ProtocolError::UnexpectedEof);
                }
                Ok(RowValue {
                    length: Length::Known(len as u32),
                    data: src.copy_to_bytes(len),
                })
            }
            Length::UnknownPlp => Err(ProtocolError::violation(
                "PLP length outside a PARTLEN column",
            )),
        }
    }

    /// Encode as a ROW token, including the type byte.
    pub fn encode(&self, metadata: &ColumnMetadata, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::Row as u8);
        for (value, column) in self.values.iter().zip(&metadata.columns) {
            Self::encode_value(value, &column.type_info, dst);
        }
    }

    /// Encode as an NBCROW token, including the type byte.
    pub fn encode_nbc(&self, metadata: &ColumnMetadata, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::NbcRow as u8);

        let mut bitmap = vec![0u8; self.values.len().div_ceil(8)];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        dst.put_slice(&bitmap);

        for (value, column) in self.values.iter().zip(&metadata.columns) {
            if !value.is_null() {
                Self::encode_value(value, &column.type_info, dst);
            }
        }
    }

    fn encode_value(value: &RowValue, ty: &TypeInformation, dst: &mut impl BufMut) {
        if ty.length_strategy() == LengthStrategy::PartLen {
            match value.length {
                Length::Null => write_plp(dst, None),
                _ => write_plp(dst, Some(&value.data)),
            }
            return;
        }

        value.length.encode(dst, ty);
        dst.put_slice(&value.data);
    }
}

bitflags::bitflags! {
    /// Status flags of the DONE token family.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DoneStatus: u16 {
        /// More result sets follow; clear on the final DONE.
        const MORE = 0x0001;
        /// The statement failed with a server error.
        const SRVERROR = 0x0002;
        /// A transaction is in progress.
        const INXACT = 0x0004;
        /// The row count field is valid.
        const COUNT = 0x0010;
        /// Acknowledges an ATTENTION (cancellation).
        const ATTN = 0x0020;
        /// An RPC within a batch of RPCs.
        const RPC_IN_BATCH = 0x0080;
    }
}

/// DONE / DONEPROC / DONEINPROC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoneToken {
    /// Status flags.
    pub status: DoneStatus,
    /// Token of the current command within the batch.
    pub cur_cmd: u16,
    /// Affected/returned row count, valid when COUNT is set.
    pub row_count: u64,
}

impl DoneToken {
    /// Body size in bytes, excluding the token type byte.
    pub const SIZE: usize = 12;

    /// A final DONE carrying a row count.
    #[must_use]
    pub fn counted(row_count: u64) -> Self {
        Self {
            status: DoneStatus::COUNT,
            cur_cmd: 0,
            row_count,
        }
    }

    /// Decode the token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }

        let status = DoneStatus::from_bits_truncate(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u64_le();

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode with the given DONE-family token type.
    pub fn encode(&self, kind: TokenType, dst: &mut impl BufMut) {
        dst.put_u8(kind as u8);
        dst.put_u16_le(self.status.bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }

    /// Whether this completion is final (MORE clear).
    #[must_use]
    pub fn is_final(&self) -> bool {
        !self.status.contains(DoneStatus::MORE)
    }

    /// Whether this completion acknowledges an ATTENTION.
    #[must_use]
    pub fn is_attention_ack(&self) -> bool {
        self.status.contains(DoneStatus::ATTN)
    }

    /// Row count if the COUNT flag is set.
    #[must_use]
    pub fn counted_rows(&self) -> Option<u64> {
        self.status
            .contains(DoneStatus::COUNT)
            .then_some(self.row_count)
    }
}

/// ERROR / INFO message from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageToken {
    /// Server-defined message number.
    pub number: i32,
    /// State qualifying the number.
    pub state: u8,
    /// Severity class; above 10 is an error.
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Reporting server name.
    pub server: String,
    /// Reporting procedure name, empty outside procedures.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: u32,
}

impl MessageToken {
    /// Decode the token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let _length = src.get_u16_le();

        if src.remaining() < 6 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let number = src.get_i32_le();
        let state = src.get_u8();
        let class = src.get_u8();

        let message = read_us_varchar(src)?;
        let server = read_b_varchar(src)?;
        let procedure = read_b_varchar(src)?;

        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let line = src.get_u32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }

    /// Encode with the given message token type.
    pub fn encode(&self, kind: TokenType, dst: &mut impl BufMut) {
        let body_len = 4
            + 1
            + 1
            + 2
            + self.message.encode_utf16().count() * 2
            + 1
            + self.server.encode_utf16().count() * 2
            + 1
            + self.procedure.encode_utf16().count() * 2
            + 4;

        dst.put_u8(kind as u8);
        dst.put_u16_le(body_len as u16);
        dst.put_i32_le(self.number);
        dst.put_u8(self.state);
        dst.put_u8(self.class);
        write_us_varchar(dst, &self.message);
        write_b_varchar(dst, &self.server);
        write_b_varchar(dst, &self.procedure);
        dst.put_u32_le(self.line);
    }

    /// Severity class 10 and below is informational.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        self.class <= 10
    }
}

/// ENVCHANGE type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvChangeType {
    /// Current database changed.
    Database = 1,
    /// Language changed.
    Language = 2,
    /// Character set changed (pre-TDS7.2).
    CharacterSet = 3,
    /// Packet size renegotiated.
    PacketSize = 4,
    /// Unicode sorting locale id.
    UnicodeSortingLocale = 5,
    /// Unicode comparison flags.
    UnicodeComparisonFlags = 6,
    /// Database collation changed.
    SqlCollation = 7,
    /// Transaction started; value is the descriptor.
    BeginTransaction = 8,
    /// Transaction committed.
    CommitTransaction = 9,
    /// Transaction rolled back.
    RollbackTransaction = 10,
    /// Session enlisted in a DTC transaction.
    EnlistDtcTransaction = 11,
    /// Connection routed to another server.
    Routing = 17,
}

impl EnvChangeType {
    /// Parse an environment change type byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Database),
            2 => Ok(Self::Language),
            3 => Ok(Self::CharacterSet),
            4 => Ok(Self::PacketSize),
            5 => Ok(Self::UnicodeSortingLocale),
            6 => Ok(Self::UnicodeComparisonFlags),
            7 => Ok(Self::SqlCollation),
            8 => Ok(Self::BeginTransaction),
            9 => Ok(Self::CommitTransaction),
            10 => Ok(Self::RollbackTransaction),
            11 => Ok(Self::EnlistDtcTransaction),
            17 => Ok(Self::Routing),
            other => Err(ProtocolError::InvalidEnvChangeType(other)),
        }
    }

    /// Whether new/old values travel as length-prefixed binary.
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::SqlCollation
                | Self::BeginTransaction
                | Self::CommitTransaction
                | Self::RollbackTransaction
                | Self::EnlistDtcTransaction
        )
    }
}

/// Value carried by an ENVCHANGE.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvChangeValue {
    /// Length-prefixed binary value.
    Binary(Bytes),
    /// Length-prefixed UCS-2 string value.
    String(String),
    /// Routing target.
    Routing {
        /// Target host name.
        host: String,
        /// Target TCP port.
        port: u16,
    },
    /// No value.
    None,
}

/// ENVCHANGE: a session environment change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvChangeToken {
    /// What changed.
    pub change_type: EnvChangeType,
    /// The new value.
    pub new_value: EnvChangeValue,
    /// The previous value.
    pub old_value: EnvChangeValue,
}

impl EnvChangeToken {
    /// Decode the token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::UnexpectedEof);
        }

        // Bound all reads to the declared token length.
        let mut body = src.copy_to_bytes(length);
        if body.remaining() < 1 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let change_type = EnvChangeType::from_u8(body.get_u8())?;

        let (new_value, old_value) = if change_type == EnvChangeType::Routing {
            let new_value = Self::decode_routing(&mut body)?;
            let _old = read_b_varbyte(&mut body)?;
            (new_value, EnvChangeValue::None)
        } else if change_type.is_binary() {
            let new = read_b_varbyte(&mut body)?;
            let old = read_b_varbyte(&mut body)?;
            (EnvChangeValue::Binary(new), EnvChangeValue::Binary(old))
        } else {
            let new = read_b_varchar(&mut body)?;
            let old = read_b_varchar(&mut body)?;
            (EnvChangeValue::String(new), EnvChangeValue::String(old))
        };

        let token = Self {
            change_type,
            new_value,
            old_value,
        };
        token.validate()?;
        Ok(token)
    }

    fn decode_routing(src: &mut impl Buf) -> Result<EnvChangeValue, ProtocolError> {
        if src.remaining() < 7 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let _routing_len = src.get_u16_le();
        let protocol = src.get_u8();
        if protocol != 0 {
            return Err(ProtocolError::InvalidValue("unknown routing protocol"));
        }
        let port = src.get_u16_le();
        let host = read_us_varchar(src)?;
        Ok(EnvChangeValue::Routing { host, port })
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if matches!(
            self.change_type,
            EnvChangeType::BeginTransaction | EnvChangeType::EnlistDtcTransaction
        ) {
            match &self.new_value {
                EnvChangeValue::Binary(bytes) if bytes.len() == 8 => {}
                EnvChangeValue::Binary(bytes) => {
                    return Err(ProtocolError::InvalidTransactionDescriptor(bytes.len()));
                }
                _ => return Err(ProtocolError::InvalidTransactionDescriptor(0)),
            }
        }
        Ok(())
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut body = bytes::BytesMut::new();
        body.put_u8(self.change_type as u8);
        match (&self.new_value, &self.old_value) {
            (EnvChangeValue::Routing { host, port }, _) => {
                let host_bytes = host.encode_utf16().count() * 2;
                body.put_u16_le((1 + 2 + 2 + host_bytes) as u16);
                body.put_u8(0);
                body.put_u16_le(*port);
                write_us_varchar(&mut body, host);
                body.put_u8(0); // empty old value
            }
            (new, old) => {
                for value in [new, old] {
                    match value {
                        EnvChangeValue::Binary(bytes) => write_b_varbyte(&mut body, bytes),
                        EnvChangeValue::String(s) => write_b_varchar(&mut body, s),
                        EnvChangeValue::None => body.put_u8(0),
                        EnvChangeValue::Routing { .. } => unreachable!(),
                    }
                }
            }
        }

        dst.put_u8(TokenType::EnvChange as u8);
        dst.put_u16_le(body.len() as u16);
        dst.put_slice(&body);
    }

    /// The new transaction descriptor for transaction-family changes.
    #[must_use]
    pub fn transaction_descriptor(&self) -> Option<&Bytes> {
        match (&self.change_type, &self.new_value) {
            (
                EnvChangeType::BeginTransaction | EnvChangeType::EnlistDtcTransaction,
                EnvChangeValue::Binary(bytes),
            ) => Some(bytes),
            _ => None,
        }
    }

    /// The renegotiated packet size for PacketSize changes.
    #[must_use]
    pub fn packet_size(&self) -> Option<u32> {
        match (&self.change_type, &self.new_value) {
            (EnvChangeType::PacketSize, EnvChangeValue::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// The new database collation for SqlCollation changes.
    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        match (&self.change_type, &self.new_value) {
            (EnvChangeType::SqlCollation, EnvChangeValue::Binary(bytes)) => {
                Collation::from_bytes(bytes).ok()
            }
            _ => None,
        }
    }
}

/// One acknowledged feature in a FEATUREEXTACK token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureAck {
    /// Feature identifier.
    pub feature_id: u8,
    /// Feature acknowledgement payload.
    pub data: Bytes,
}

/// FEATUREEXTACK: the server's answer to requested feature extensions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureExtAckToken {
    /// Acknowledged features in server order.
    pub features: Vec<FeatureAck>,
}

impl FeatureExtAckToken {
    /// Terminating feature id.
    pub const TERMINATOR: u8 = 0xFF;

    /// Feature id of column encryption support.
    pub const COLUMN_ENCRYPTION: u8 = 0x04;

    /// Decode the token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut features = Vec::new();

        loop {
            if src.remaining() < 1 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let feature_id = src.get_u8();
            if feature_id == Self::TERMINATOR {
                break;
            }

            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let data_len = src.get_u32_le() as usize;
            if src.remaining() < data_len {
                return Err(ProtocolError::UnexpectedEof);
            }

            features.push(FeatureAck {
                feature_id,
                data: src.copy_to_bytes(data_len),
            });
        }

        Ok(Self { features })
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::FeatureExtAck as u8);
        for feature in &self.features {
            dst.put_u8(feature.feature_id);
            dst.put_u32_le(feature.data.len() as u32);
            dst.put_slice(&feature.data);
        }
        dst.put_u8(Self::TERMINATOR);
    }

    /// Whether the server acknowledged column encryption support.
    #[must_use]
    pub fn column_encryption_supported(&self) -> bool {
        self.features
            .iter()
            .any(|f| f.feature_id == Self::COLUMN_ENCRYPTION)
    }
}

/// LOGINACK: successful login, carrying the negotiated TDS version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAckToken {
    /// SQL interface type.
    pub interface: u8,
    /// Negotiated TDS version, big-endian on the wire.
    pub tds_version: u32,
    /// Server program name.
    pub program_name: String,
    /// Server build version.
    pub program_version: u32,
}

impl LoginAckToken {
    /// Decode the token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let _length = src.get_u16_le();

        if src.remaining() < 5 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let interface = src.get_u8();
        let tds_version = src.get_u32_le();
        let program_name = read_b_varchar(src)?;

        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let program_version = src.get_u32_le();

        Ok(Self {
            interface,
            tds_version,
            program_name,
            program_version,
        })
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let body_len = 1 + 4 + 1 + self.program_name.encode_utf16().count() * 2 + 4;
        dst.put_u8(TokenType::LoginAck as u8);
        dst.put_u16_le(body_len as u16);
        dst.put_u8(self.interface);
        dst.put_u32_le(self.tds_version);
        write_b_varchar(dst, &self.program_name);
        dst.put_u32_le(self.program_version);
    }
}

/// ORDER: columns the result set is ordered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderToken {
    /// One-based column indices.
    pub columns: Vec<u16>,
}

impl OrderToken {
    /// Decode the token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut columns = Vec::with_capacity(length / 2);
        for _ in 0..length / 2 {
            columns.push(src.get_u16_le());
        }
        Ok(Self { columns })
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::Order as u8);
        dst.put_u16_le((self.columns.len() * 2) as u16);
        for &column in &self.columns {
            dst.put_u16_le(column);
        }
    }
}

/// Streaming reader over the tokens of one logical message.
///
/// Carries the COLMETADATA context: a ROW or NBCROW is only valid in the
/// scope of the most recent metadata token, which this reader tracks.
#[derive(Debug)]
pub struct TokenStreamReader {
    data: Bytes,
    metadata: Option<ColumnMetadata>,
}

impl TokenStreamReader {
    /// Read tokens from the start of a message.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            metadata: None,
        }
    }

    /// Read tokens with schema context carried over from an earlier message.
    #[must_use]
    pub fn with_metadata(data: Bytes, metadata: Option<ColumnMetadata>) -> Self {
        Self { data, metadata }
    }

    /// The schema currently in scope.
    #[must_use]
    pub fn metadata(&self) -> Option<&ColumnMetadata> {
        self.metadata.as_ref()
    }

    /// Recover the schema for the next message of the same response.
    #[must_use]
    pub fn into_metadata(self) -> Option<ColumnMetadata> {
        self.metadata
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    /// Parse the next token, or `None` at the end of the message.
    ///
    /// On error the reader stops at the error point; no bytes beyond it are
    /// consumed.
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        if !self.data.has_remaining() {
            return Ok(None);
        }

        let token_type = TokenType::from_u8(self.data.get_u8())?;
        let src = &mut self.data;

        let token = match token_type {
            TokenType::ColMetaData => {
                let metadata = ColumnMetadata::decode(src)?;
                self.metadata = Some(metadata.clone());
                Token::ColumnMetadata(metadata)
            }
            TokenType::Row => {
                let metadata = self
                    .metadata
                    .as_ref()
                    .ok_or_else(|| ProtocolError::violation("ROW token without metadata"))?;
                Token::Row(RowToken::decode(src, metadata)?)
            }
            TokenType::NbcRow => {
                let metadata = self
                    .metadata
                    .as_ref()
                    .ok_or_else(|| ProtocolError::violation("NBCROW token without metadata"))?;
                Token::NbcRow(RowToken::decode_nbc(src, metadata)?)
            }
            TokenType::Done => Token::Done(DoneToken::decode(src)?),
            TokenType::DoneProc => Token::DoneProc(DoneToken::decode(src)?),
            TokenType::DoneInProc => Token::DoneInProc(DoneToken::decode(src)?),
            TokenType::Error => Token::Error(MessageToken::decode(src)?),
            TokenType::Info => Token::Info(MessageToken::decode(src)?),
            TokenType::EnvChange => Token::EnvChange(EnvChangeToken::decode(src)?),
            TokenType::FeatureExtAck => Token::FeatureExtAck(FeatureExtAckToken::decode(src)?),
            TokenType::LoginAck => Token::LoginAck(LoginAckToken::decode(src)?),
            TokenType::ReturnStatus => {
                if src.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                Token::ReturnStatus(src.get_i32_le())
            }
            TokenType::Order => Token::Order(OrderToken::decode(src)?),
        };

        Ok(Some(token))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::TypeInformation;
    use bytes::BytesMut;

    fn int_column(index: usize, name: &str) -> Column {
        Column {
            index,
            name: name.to_string(),
            type_info: TypeInformation::builder(SqlServerType::Int)
                .length_strategy(LengthStrategy::ByteLen)
                .max_length(4)
                .build(),
            table_name: None,
        }
    }

    #[test]
    fn done_roundtrip() {
        let done = DoneToken {
            status: DoneStatus::COUNT | DoneStatus::INXACT,
            cur_cmd: 193,
            row_count: 42,
        };

        let mut buf = BytesMut::new();
        done.encode(TokenType::Done, &mut buf);

        let mut cursor = buf.freeze();
        assert_eq!(cursor.get_u8(), TokenType::Done as u8);
        let decoded = DoneToken::decode(&mut cursor).unwrap();
        assert_eq!(decoded, done);
        assert!(decoded.is_final());
        assert_eq!(decoded.counted_rows(), Some(42));
    }

    #[test]
    fn final_done_predicate() {
        let more = Token::Done(DoneToken {
            status: DoneStatus::MORE | DoneStatus::COUNT,
            cur_cmd: 0,
            row_count: 1,
        });
        let final_done = Token::Done(DoneToken::counted(1));
        let done_in_proc = Token::DoneInProc(DoneToken::counted(1));

        assert!(!more.is_final_done());
        assert!(final_done.is_final_done());
        assert!(!done_in_proc.is_final_done());
    }

    #[test]
    fn message_roundtrip() {
        let error = MessageToken {
            number: 208,
            state: 1,
            class: 16,
            message: "Invalid object name 'foo'.".to_string(),
            server: "sqlserver".to_string(),
            procedure: String::new(),
            line: 1,
        };

        let mut buf = BytesMut::new();
        error.encode(TokenType::Error, &mut buf);

        let mut cursor = buf.freeze();
        assert_eq!(cursor.get_u8(), TokenType::Error as u8);
        let decoded = MessageToken::decode(&mut cursor).unwrap();
        assert_eq!(decoded, error);
        assert!(!decoded.is_informational());
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn env_change_begin_transaction_roundtrip() {
        let token = EnvChangeToken {
            change_type: EnvChangeType::BeginTransaction,
            new_value: EnvChangeValue::Binary(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8])),
            old_value: EnvChangeValue::Binary(Bytes::new()),
        };

        let mut buf = BytesMut::new();
        token.encode(&mut buf);

        let mut cursor = buf.freeze();
        assert_eq!(cursor.get_u8(), TokenType::EnvChange as u8);
        let decoded = EnvChangeToken::decode(&mut cursor).unwrap();
        assert_eq!(decoded, token);
        assert_eq!(
            decoded.transaction_descriptor().map(|b| b.len()),
            Some(8)
        );
    }

    #[test]
    fn env_change_rejects_short_descriptor() {
        let token = EnvChangeToken {
            change_type: EnvChangeType::BeginTransaction,
            new_value: EnvChangeValue::Binary(Bytes::from_static(&[1, 2, 3])),
            old_value: EnvChangeValue::Binary(Bytes::new()),
        };

        let mut buf = BytesMut::new();
        token.encode(&mut buf);

        let mut cursor = buf.freeze();
        cursor.advance(1);
        assert_eq!(
            EnvChangeToken::decode(&mut cursor),
            Err(ProtocolError::InvalidTransactionDescriptor(3))
        );
    }

    #[test]
    fn env_change_packet_size() {
        let token = EnvChangeToken {
            change_type: EnvChangeType::PacketSize,
            new_value: EnvChangeValue::String("8192".to_string()),
            old_value: EnvChangeValue::String("4096".to_string()),
        };

        let mut buf = BytesMut::new();
        token.encode(&mut buf);

        let mut cursor = buf.freeze();
        cursor.advance(1);
        let decoded = EnvChangeToken::decode(&mut cursor).unwrap();
        assert_eq!(decoded.packet_size(), Some(8192));
    }

    #[test]
    fn feature_ext_ack_roundtrip() {
        let token = FeatureExtAckToken {
            features: vec![FeatureAck {
                feature_id: FeatureExtAckToken::COLUMN_ENCRYPTION,
                data: Bytes::from_static(&[0x01]),
            }],
        };

        let mut buf = BytesMut::new();
        token.encode(&mut buf);

        let mut cursor = buf.freeze();
        cursor.advance(1);
        let decoded = FeatureExtAckToken::decode(&mut cursor).unwrap();
        assert_eq!(decoded, token);
        assert!(decoded.column_encryption_supported());
    }

    #[test]
    fn login_ack_roundtrip() {
        let token = LoginAckToken {
            interface: 1,
            tds_version: 0x7400_0004,
            program_name: "Microsoft SQL Server".to_string(),
            program_version: 0x0F00_07D0,
        };

        let mut buf = BytesMut::new();
        token.encode(&mut buf);

        let mut cursor = buf.freeze();
        cursor.advance(1);
        assert_eq!(LoginAckToken::decode(&mut cursor).unwrap(), token);
    }

    #[test]
    fn order_roundtrip() {
        let token = OrderToken {
            columns: vec![1, 3],
        };
        let mut buf = BytesMut::new();
        token.encode(&mut buf);

        let mut cursor = buf.freeze();
        cursor.advance(1);
        assert_eq!(OrderToken::decode(&mut cursor).unwrap(), token);
    }

    #[test]
    fn colmetadata_no_metadata_marker() {
        let mut cursor = Bytes::from_static(&[0xFF, 0xFF]);
        let meta = ColumnMetadata::decode(&mut cursor).unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn row_reader_requires_metadata() {
        let mut buf = BytesMut::new();
        buf.put_u8(TokenType::Row as u8);
        buf.put_u8(4);
        buf.put_i32_le(7);

        let mut reader = TokenStreamReader::new(buf.freeze());
        assert!(reader.next_token().is_err());
    }

    #[test]
    fn token_stream_tracks_metadata() {
        let metadata = ColumnMetadata {
            columns: vec![int_column(0, "id")],
        };
        let row = RowToken {
            values: vec![RowValue::new(Bytes::from_static(&[0x2A, 0, 0, 0]))],
        };

        let mut buf = BytesMut::new();
        metadata.encode(&mut buf);
        row.encode(&metadata, &mut buf);
        DoneToken::counted(1).encode(TokenType::Done, &mut buf);

        let mut reader = TokenStreamReader::new(buf.freeze());

        match reader.next_token().unwrap().unwrap() {
            Token::ColumnMetadata(meta) => assert_eq!(meta.column_count(), 1),
            other => panic!("expected metadata, got {other:?}"),
        }
        match reader.next_token().unwrap().unwrap() {
            Token::Row(row) => {
                assert_eq!(row.values.len(), 1);
                assert_eq!(&row.values[0].data[..], &[0x2A, 0, 0, 0]);
            }
            other => panic!("expected row, got {other:?}"),
        }
        assert!(reader.next_token().unwrap().unwrap().is_final_done());
        assert!(reader.next_token().unwrap().is_none());
    }

    #[test]
    fn nbc_row_roundtrip() {
        let metadata = ColumnMetadata {
            columns: vec![
                int_column(0, "a"),
                int_column(1, "b"),
                int_column(2, "c"),
            ],
        };
        let row = RowToken {
            values: vec![
                RowValue::null(),
                RowValue::new(Bytes::from_static(&[9, 0, 0, 0])),
                RowValue::null(),
            ],
        };

        let mut buf = BytesMut::new();
        row.encode_nbc(&metadata, &mut buf);

        let mut cursor = buf.freeze();
        assert_eq!(cursor.get_u8(), TokenType::NbcRow as u8);
        // Bitmap: columns 0 and 2 null -> 0b0000_0101.
        assert_eq!(cursor[0], 0b0000_0101);

        let decoded = RowToken::decode_nbc(&mut cursor, &metadata).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn unknown_token_byte_is_error() {
        let mut reader = TokenStreamReader::new(Bytes::from_static(&[0x42, 0x00]));
        assert_eq!(
            reader.next_token(),
            Err(ProtocolError::InvalidTokenType(0x42))
        );
    }
}
