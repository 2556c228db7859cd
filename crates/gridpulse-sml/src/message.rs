//! The SML message envelope and the request/response bodies of the
//! supported subset.
//!
//! An SML file on the wire is a plain concatenation of messages, each a
//! six-element list `(transaction_id, group_no, abort_on_error, body,
//! crc16, end marker)`. The body is a tagged choice; tags outside the
//! subset are structurally skipped and reported as
//! [`MessageBody::Unknown`]. Zero bytes between messages (transport
//! padding) are ignored.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

use crate::crc::fcs16;
use crate::cursor::ParseCursor;
use crate::error::Error;
use crate::value::{
    END_OF_MESSAGE, OctetStr, TYPE_LIST, Value, encode_omitted, expect_list, parse_i8, parse_u8,
    parse_u16, parse_u32, read_tl, skip_element, take_optional, write_i8, write_list_tl, write_u8,
    write_u16, write_u32,
};

pub const OPEN_REQUEST: u32 = 0x0000_0100;
pub const OPEN_RESPONSE: u32 = 0x0000_0101;
pub const CLOSE_REQUEST: u32 = 0x0000_0200;
pub const CLOSE_RESPONSE: u32 = 0x0000_0201;
pub const GET_PROFILE_PACK_REQUEST: u32 = 0x0000_0300;
pub const GET_PROFILE_PACK_RESPONSE: u32 = 0x0000_0301;
pub const GET_PROFILE_LIST_REQUEST: u32 = 0x0000_0400;
pub const GET_PROFILE_LIST_RESPONSE: u32 = 0x0000_0401;
pub const GET_PROC_PARAMETER_REQUEST: u32 = 0x0000_0500;
pub const GET_PROC_PARAMETER_RESPONSE: u32 = 0x0000_0501;
pub const SET_PROC_PARAMETER_REQUEST: u32 = 0x0000_0600;
pub const GET_LIST_REQUEST: u32 = 0x0000_0700;
pub const GET_LIST_RESPONSE: u32 = 0x0000_0701;
pub const ATTENTION_RESPONSE: u32 = 0x0000_ff01;

static NEXT_TRANSACTION: AtomicU32 = AtomicU32::new(1);

/// A sequence of SML messages as exchanged in one request or response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct File {
    pub messages: Vec<Message>,
}

impl File {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Parse a message stream (already stripped of transport framing).
    /// Zero padding between and after messages is tolerated.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = ParseCursor::new(bytes);
        let mut messages = Vec::new();

        while cursor.has_remaining() {
            if cursor.try_peek_u8()? == END_OF_MESSAGE {
                cursor.try_skip(1)?;
                continue;
            }
            messages.push(Message::parse(&mut cursor)?);
        }

        Ok(Self { messages })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for message in &self.messages {
            message.encode(&mut out);
        }
        out
    }
}

/// One SML message with its envelope fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub transaction_id: OctetStr,
    pub group_no: u8,
    pub abort_on_error: u8,
    pub body: MessageBody,
}

impl Message {
    /// Build a message with a fresh process-wide transaction id.
    pub fn new(group_no: u8, body: MessageBody) -> Self {
        let id = NEXT_TRANSACTION.fetch_add(1, Relaxed);
        Self {
            transaction_id: OctetStr::new(id.to_string().into_bytes()),
            group_no,
            abort_on_error: 0,
            body,
        }
    }

    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        let start = cursor.position();

        expect_list(cursor, 6)?;
        let transaction_id = OctetStr::parse(cursor)?;
        let group_no = parse_u8(cursor)?;
        let abort_on_error = parse_u8(cursor)?;
        let body = MessageBody::parse(cursor)?;

        // checksum covers the message from its list TL up to the crc field
        let crc_start = cursor.position();
        let received = parse_u16(cursor)?;
        let computed = fcs16(cursor.slice(start, crc_start));
        if computed != received {
            return Err(Error::CrcMismatch { computed, received });
        }

        let end = cursor.try_get_u8()?;
        if end != END_OF_MESSAGE {
            return Err(Error::MissingEndMarker(end));
        }

        Ok(Self {
            transaction_id,
            group_no,
            abort_on_error,
            body,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();

        write_list_tl(out, 6);
        self.transaction_id.encode(out);
        write_u8(out, self.group_no);
        write_u8(out, self.abort_on_error);
        self.body.encode(out);

        let crc = fcs16(&out[start..]);
        write_u16(out, crc);
        out.push(END_OF_MESSAGE);
    }
}

/// The tagged choice of message bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    OpenRequest(OpenRequest),
    OpenResponse(OpenResponse),
    CloseRequest(CloseRequest),
    CloseResponse(CloseResponse),
    GetProcParameterRequest(GetProcParameterRequest),
    GetProcParameterResponse(GetProcParameterResponse),
    AttentionResponse(AttentionResponse),
    /// A recognized envelope whose body lies outside the supported
    /// subset; its content was skipped. Encodes as an omitted element.
    Unknown(u32),
}

impl MessageBody {
    pub fn tag(&self) -> u32 {
        match self {
            MessageBody::OpenRequest(_) => OPEN_REQUEST,
            MessageBody::OpenResponse(_) => OPEN_RESPONSE,
            MessageBody::CloseRequest(_) => CLOSE_REQUEST,
            MessageBody::CloseResponse(_) => CLOSE_RESPONSE,
            MessageBody::GetProcParameterRequest(_) => GET_PROC_PARAMETER_REQUEST,
            MessageBody::GetProcParameterResponse(_) => GET_PROC_PARAMETER_RESPONSE,
            MessageBody::AttentionResponse(_) => ATTENTION_RESPONSE,
            MessageBody::Unknown(tag) => *tag,
        }
    }

    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 2)?;
        let tag = parse_u32(cursor)?;

        let body = match tag {
            OPEN_REQUEST => MessageBody::OpenRequest(OpenRequest::parse(cursor)?),
            OPEN_RESPONSE => MessageBody::OpenResponse(OpenResponse::parse(cursor)?),
            CLOSE_REQUEST => MessageBody::CloseRequest(CloseRequest::parse(cursor)?),
            CLOSE_RESPONSE => MessageBody::CloseResponse(CloseResponse::parse(cursor)?),
            GET_PROC_PARAMETER_REQUEST => {
                MessageBody::GetProcParameterRequest(GetProcParameterRequest::parse(cursor)?)
            }
            GET_PROC_PARAMETER_RESPONSE => {
                MessageBody::GetProcParameterResponse(GetProcParameterResponse::parse(cursor)?)
            }
            ATTENTION_RESPONSE => MessageBody::AttentionResponse(AttentionResponse::parse(cursor)?),
            other => {
                skip_element(cursor)?;
                MessageBody::Unknown(other)
            }
        };

        Ok(body)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 2);
        write_u32(out, self.tag());

        match self {
            MessageBody::OpenRequest(body) => body.encode(out),
            MessageBody::OpenResponse(body) => body.encode(out),
            MessageBody::CloseRequest(body) => body.encode(out),
            MessageBody::CloseResponse(body) => body.encode(out),
            MessageBody::GetProcParameterRequest(body) => body.encode(out),
            MessageBody::GetProcParameterResponse(body) => body.encode(out),
            MessageBody::AttentionResponse(body) => body.encode(out),
            MessageBody::Unknown(_) => encode_omitted(out),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenRequest {
    pub codepage: Option<OctetStr>,
    pub client_id: Option<OctetStr>,
    pub req_file_id: OctetStr,
    pub server_id: Option<OctetStr>,
    pub username: Option<OctetStr>,
    pub password: Option<OctetStr>,
    pub sml_version: Option<u8>,
}

impl OpenRequest {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 7)?;
        Ok(Self {
            codepage: parse_optional_octet(cursor)?,
            client_id: parse_optional_octet(cursor)?,
            req_file_id: OctetStr::parse(cursor)?,
            server_id: parse_optional_octet(cursor)?,
            username: parse_optional_octet(cursor)?,
            password: parse_optional_octet(cursor)?,
            sml_version: parse_optional_u8(cursor)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 7);
        encode_optional_octet(out, &self.codepage);
        encode_optional_octet(out, &self.client_id);
        self.req_file_id.encode(out);
        encode_optional_octet(out, &self.server_id);
        encode_optional_octet(out, &self.username);
        encode_optional_octet(out, &self.password);
        match self.sml_version {
            Some(version) => write_u8(out, version),
            None => encode_omitted(out),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenResponse {
    pub codepage: Option<OctetStr>,
    pub client_id: Option<OctetStr>,
    pub req_file_id: OctetStr,
    pub server_id: OctetStr,
    pub ref_time: Option<Time>,
    pub sml_version: Option<u8>,
}

impl OpenResponse {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 6)?;
        Ok(Self {
            codepage: parse_optional_octet(cursor)?,
            client_id: parse_optional_octet(cursor)?,
            req_file_id: OctetStr::parse(cursor)?,
            server_id: OctetStr::parse(cursor)?,
            ref_time: if take_optional(cursor)? {
                Some(Time::parse(cursor)?)
            } else {
                None
            },
            sml_version: parse_optional_u8(cursor)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 6);
        encode_optional_octet(out, &self.codepage);
        encode_optional_octet(out, &self.client_id);
        self.req_file_id.encode(out);
        self.server_id.encode(out);
        match &self.ref_time {
            Some(time) => time.encode(out),
            None => encode_omitted(out),
        }
        match self.sml_version {
            Some(version) => write_u8(out, version),
            None => encode_omitted(out),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseRequest {
    pub global_signature: Option<OctetStr>,
}

impl CloseRequest {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 1)?;
        Ok(Self {
            global_signature: parse_optional_octet(cursor)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 1);
        encode_optional_octet(out, &self.global_signature);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseResponse {
    pub global_signature: Option<OctetStr>,
}

impl CloseResponse {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 1)?;
        Ok(Self {
            global_signature: parse_optional_octet(cursor)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 1);
        encode_optional_octet(out, &self.global_signature);
    }
}

/// The path selecting a subtree of the meter's parameter tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreePath(pub Vec<OctetStr>);

impl TreePath {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        let (tl, _) = read_tl(cursor)?;
        if tl.ty != TYPE_LIST {
            return Err(Error::UnexpectedElement {
                expected: "tree path",
                found: tl.ty,
            });
        }

        let mut entries = Vec::with_capacity(tl.len);
        for _ in 0..tl.len {
            entries.push(OctetStr::parse(cursor)?);
        }
        Ok(Self(entries))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, self.0.len());
        for entry in &self.0 {
            entry.encode(out);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetProcParameterRequest {
    pub server_id: Option<OctetStr>,
    pub username: Option<OctetStr>,
    pub password: Option<OctetStr>,
    pub parameter_tree_path: TreePath,
    pub attribute: Option<OctetStr>,
}

impl GetProcParameterRequest {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 5)?;
        Ok(Self {
            server_id: parse_optional_octet(cursor)?,
            username: parse_optional_octet(cursor)?,
            password: parse_optional_octet(cursor)?,
            parameter_tree_path: TreePath::parse(cursor)?,
            attribute: parse_optional_octet(cursor)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 5);
        encode_optional_octet(out, &self.server_id);
        encode_optional_octet(out, &self.username);
        encode_optional_octet(out, &self.password);
        self.parameter_tree_path.encode(out);
        encode_optional_octet(out, &self.attribute);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetProcParameterResponse {
    pub server_id: OctetStr,
    pub parameter_tree_path: TreePath,
    pub parameter_tree: Tree,
}

impl GetProcParameterResponse {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 3)?;
        Ok(Self {
            server_id: OctetStr::parse(cursor)?,
            parameter_tree_path: TreePath::parse(cursor)?,
            parameter_tree: Tree::parse(cursor)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 3);
        self.server_id.encode(out);
        self.parameter_tree_path.encode(out);
        self.parameter_tree.encode(out);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttentionResponse {
    pub server_id: OctetStr,
    pub attention_number: OctetStr,
    pub attention_message: Option<OctetStr>,
    pub attention_details: Option<Tree>,
}

impl AttentionResponse {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 4)?;
        Ok(Self {
            server_id: OctetStr::parse(cursor)?,
            attention_number: OctetStr::parse(cursor)?,
            attention_message: parse_optional_octet(cursor)?,
            attention_details: if take_optional(cursor)? {
                Some(Tree::parse(cursor)?)
            } else {
                None
            },
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 4);
        self.server_id.encode(out);
        self.attention_number.encode(out);
        encode_optional_octet(out, &self.attention_message);
        match &self.attention_details {
            Some(tree) => tree.encode(out),
            None => encode_omitted(out),
        }
    }
}

/// A node of the meter's parameter tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    pub parameter_name: OctetStr,
    pub parameter_value: Option<ProcParValue>,
    pub child_list: Vec<Tree>,
}

impl Tree {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 3)?;

        let parameter_name = OctetStr::parse(cursor)?;
        let parameter_value = if take_optional(cursor)? {
            Some(ProcParValue::parse(cursor)?)
        } else {
            None
        };

        let child_list = if take_optional(cursor)? {
            let (tl, _) = read_tl(cursor)?;
            if tl.ty != TYPE_LIST {
                return Err(Error::UnexpectedElement {
                    expected: "child list",
                    found: tl.ty,
                });
            }
            let mut children = Vec::with_capacity(tl.len);
            for _ in 0..tl.len {
                children.push(Tree::parse(cursor)?);
            }
            children
        } else {
            Vec::new()
        };

        Ok(Self {
            parameter_name,
            parameter_value,
            child_list,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 3);
        self.parameter_name.encode(out);
        match &self.parameter_value {
            Some(value) => value.encode(out),
            None => encode_omitted(out),
        }
        if self.child_list.is_empty() {
            encode_omitted(out);
        } else {
            write_list_tl(out, self.child_list.len());
            for child in &self.child_list {
                child.encode(out);
            }
        }
    }
}

/// The tagged choice attached to a tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcParValue {
    Value(Value),
    PeriodEntry(PeriodEntry),
    /// Tuple entries are skipped structurally; the agent has no use for
    /// them.
    TupelEntry,
    Time(Time),
    /// A choice tag outside the subset; content skipped.
    Unknown(u8),
}

impl ProcParValue {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 2)?;

        let tag = parse_u8(cursor)?;
        match tag {
            0x01 => Ok(ProcParValue::Value(Value::parse(cursor)?)),
            0x02 => Ok(ProcParValue::PeriodEntry(PeriodEntry::parse(cursor)?)),
            0x03 => {
                skip_element(cursor)?;
                Ok(ProcParValue::TupelEntry)
            }
            0x04 => Ok(ProcParValue::Time(Time::parse(cursor)?)),
            other => {
                skip_element(cursor)?;
                Ok(ProcParValue::Unknown(other))
            }
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 2);
        match self {
            ProcParValue::Value(value) => {
                write_u8(out, 0x01);
                value.encode(out);
            }
            ProcParValue::PeriodEntry(entry) => {
                write_u8(out, 0x02);
                entry.encode(out);
            }
            ProcParValue::TupelEntry => {
                write_u8(out, 0x03);
                encode_omitted(out);
            }
            ProcParValue::Time(time) => {
                write_u8(out, 0x04);
                time.encode(out);
            }
            ProcParValue::Unknown(tag) => {
                write_u8(out, *tag);
                encode_omitted(out);
            }
        }
    }
}

/// One measurand in a proc-parameter tree: the OBIS object name plus its
/// (optionally scaled) value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodEntry {
    pub obj_name: OctetStr,
    pub unit: Option<u8>,
    pub scaler: Option<i8>,
    pub value: Option<Value>,
    pub value_signature: Option<OctetStr>,
}

impl PeriodEntry {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 5)?;
        Ok(Self {
            obj_name: OctetStr::parse(cursor)?,
            unit: parse_optional_u8(cursor)?,
            scaler: if take_optional(cursor)? {
                Some(parse_i8(cursor)?)
            } else {
                None
            },
            value: if take_optional(cursor)? {
                Some(Value::parse(cursor)?)
            } else {
                None
            },
            value_signature: parse_optional_octet(cursor)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 5);
        self.obj_name.encode(out);
        match self.unit {
            Some(unit) => write_u8(out, unit),
            None => encode_omitted(out),
        }
        match self.scaler {
            Some(scaler) => write_i8(out, scaler),
            None => encode_omitted(out),
        }
        match &self.value {
            Some(value) => value.encode(out),
            None => encode_omitted(out),
        }
        encode_optional_octet(out, &self.value_signature);
    }
}

/// An SML time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Time {
    SecIndex(u32),
    Timestamp(u32),
    /// A time choice outside the subset; content skipped.
    Other(u8),
}

impl Time {
    fn parse(cursor: &mut ParseCursor) -> Result<Self, Error> {
        expect_list(cursor, 2)?;

        let tag = parse_u8(cursor)?;
        match tag {
            0x01 => Ok(Time::SecIndex(parse_u32(cursor)?)),
            0x02 => Ok(Time::Timestamp(parse_u32(cursor)?)),
            other => {
                skip_element(cursor)?;
                Ok(Time::Other(other))
            }
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        write_list_tl(out, 2);
        match self {
            Time::SecIndex(value) => {
                write_u8(out, 0x01);
                write_u32(out, *value);
            }
            Time::Timestamp(value) => {
                write_u8(out, 0x02);
                write_u32(out, *value);
            }
            Time::Other(tag) => {
                write_u8(out, *tag);
                encode_omitted(out);
            }
        }
    }
}

fn parse_optional_octet(cursor: &mut ParseCursor) -> Result<Option<OctetStr>, Error> {
    if take_optional(cursor)? {
        Ok(Some(OctetStr::parse(cursor)?))
    } else {
        Ok(None)
    }
}

fn parse_optional_u8(cursor: &mut ParseCursor) -> Result<Option<u8>, Error> {
    if take_optional(cursor)? {
        Ok(Some(parse_u8(cursor)?))
    } else {
        Ok(None)
    }
}

fn encode_optional_octet(out: &mut Vec<u8>, value: &Option<OctetStr>) {
    match value {
        Some(octet) => octet.encode(out),
        None => encode_omitted(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_file() -> File {
        let mut file = File::new();

        file.add_message(Message::new(
            1,
            MessageBody::OpenRequest(OpenRequest {
                client_id: Some(OctetStr::from_hex("010203040506").unwrap()),
                req_file_id: OctetStr::from_hex("51").unwrap(),
                server_id: Some(OctetStr::from_hex("FFFFFFFFFFFF").unwrap()),
                ..OpenRequest::default()
            }),
        ));
        file.add_message(Message::new(
            2,
            MessageBody::GetProcParameterRequest(GetProcParameterRequest {
                server_id: Some(OctetStr::from_hex("FFFFFFFFFFFF").unwrap()),
                parameter_tree_path: TreePath(vec![OctetStr::from_hex("8181C78501FF").unwrap()]),
                ..GetProcParameterRequest::default()
            }),
        ));
        file.add_message(Message::new(
            3,
            MessageBody::CloseRequest(CloseRequest::default()),
        ));

        file
    }

    fn period_node(obj_name: &str, scaler: Option<i8>, value: i64) -> Tree {
        Tree {
            parameter_name: OctetStr::from_hex(obj_name).unwrap(),
            parameter_value: Some(ProcParValue::PeriodEntry(PeriodEntry {
                obj_name: OctetStr::from_hex(obj_name).unwrap(),
                unit: Some(27),
                scaler,
                value: Some(Value::Int(value)),
                value_signature: None,
            })),
            child_list: Vec::new(),
        }
    }

    #[test]
    fn request_file_round_trip() {
        let file = request_file();
        let bytes = file.to_bytes();

        let decoded = File::parse(&bytes).unwrap();
        assert_eq!(decoded, file);

        assert_eq!(decoded.messages.len(), 3);
        assert_eq!(decoded.messages[0].group_no, 1);
        assert_eq!(decoded.messages[1].group_no, 2);
        assert_eq!(decoded.messages[2].group_no, 3);
        assert!(decoded.messages.iter().all(|m| m.abort_on_error == 0));
    }

    #[test]
    fn transaction_ids_are_distinct() {
        let a = Message::new(1, MessageBody::CloseRequest(CloseRequest::default()));
        let b = Message::new(1, MessageBody::CloseRequest(CloseRequest::default()));
        assert_ne!(a.transaction_id, b.transaction_id);
    }

    #[test]
    fn proc_parameter_response_round_trip() {
        let response = GetProcParameterResponse {
            server_id: OctetStr::from_hex("FFFFFFFFFFFF").unwrap(),
            parameter_tree_path: TreePath(vec![OctetStr::from_hex("8181C78501FF").unwrap()]),
            parameter_tree: Tree {
                parameter_name: OctetStr::from_hex("8181C78501FF").unwrap(),
                parameter_value: None,
                child_list: vec![
                    period_node("0100230700FF", Some(-1), 1234),
                    period_node("0100370700FF", None, 567),
                ],
            },
        };

        let mut file = File::new();
        file.add_message(Message::new(
            1,
            MessageBody::GetProcParameterResponse(response.clone()),
        ));

        let decoded = File::parse(&file.to_bytes()).unwrap();
        match &decoded.messages[0].body {
            MessageBody::GetProcParameterResponse(parsed) => assert_eq!(parsed, &response),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn corrupted_message_fails_crc() {
        let mut bytes = request_file().to_bytes();
        // flip one bit inside the first message's transaction id
        bytes[2] ^= 0x01;

        match File::parse(&bytes) {
            Err(Error::CrcMismatch { .. }) => {}
            other => panic!("expected crc mismatch, got {other:?}"),
        }
    }

    #[test]
    fn padding_between_messages_is_skipped() {
        let mut bytes = request_file().to_bytes();
        bytes.extend_from_slice(&[0x00, 0x00, 0x00]);

        let decoded = File::parse(&bytes).unwrap();
        assert_eq!(decoded.messages.len(), 3);
    }

    #[test]
    fn unknown_body_is_skipped_not_fatal() {
        // hand-assemble a message with a get-list-request body the
        // subset does not model: list of 2 entries
        let mut out = Vec::new();
        let start = out.len();
        write_list_tl(&mut out, 6);
        OctetStr::new(b"1".to_vec()).encode(&mut out);
        write_u8(&mut out, 1);
        write_u8(&mut out, 0);
        write_list_tl(&mut out, 2);
        write_u32(&mut out, GET_LIST_REQUEST);
        write_list_tl(&mut out, 2);
        encode_omitted(&mut out);
        encode_omitted(&mut out);
        let crc = fcs16(&out[start..]);
        write_u16(&mut out, crc);
        out.push(END_OF_MESSAGE);

        let decoded = File::parse(&out).unwrap();
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(
            decoded.messages[0].body,
            MessageBody::Unknown(GET_LIST_REQUEST)
        );
    }

    #[test]
    fn empty_stream_parses_to_empty_file() {
        assert!(File::parse(&[]).unwrap().messages.is_empty());
        assert!(File::parse(&[0x00; 4]).unwrap().messages.is_empty());
    }
}
