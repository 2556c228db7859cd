//! The SML meter client: multicast discovery, one TCP request/response
//! exchange per sample, and extraction of the OBIS-coded readings from
//! the proc-parameter tree.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::time::Duration;

use gridpulse_common::measurement::{Measurement, NUM_VARIABLES, VarId};
use gridpulse_common::{clock, obis};
use gridpulse_sml::{
    CloseRequest, File, GetProcParameterRequest, Message, MessageBody, OctetStr, OpenRequest,
    PeriodEntry, ProcParValue, Tree, TreePath, transport,
};
use tracing::{debug, error, info, trace, warn};

/// Largest response read in one go.
pub const MTU: usize = 1500;

/// Port of both the announcement multicast and the meter's TCP endpoint.
const DISCOVERY_PORT: u16 = 7259;
const DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(232, 0, 100, 0);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

// Request identities the meter accepts; vendor-specific.
const CLIENT_ID: &str = "010203040506";
const REQ_FILE_ID: &str = "51";
const BROADCAST_SERVER_ID: &str = "FFFFFFFFFFFF";
const PARAMETER_PATH: &str = "8181C78501FF";

#[derive(thiserror::Error, Debug)]
pub enum MeterError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("malformed response: {0}")]
    Protocol(#[from] gridpulse_sml::Error),

    #[error("peer performed orderly shutdown before responding")]
    PeerClosed,

    #[error("response of {0} bytes is shorter than its transport envelope")]
    ShortResponse(usize),

    #[error("only {got} of {expected} variables measured")]
    Partial { got: usize, expected: usize },
}

/// Client for one SML-speaking meter.
///
/// Per connection the exchange runs `Disconnected -> Connecting ->
/// Connected -> Requested -> Responded -> Disconnected`; any I/O or
/// parse error short-circuits to `Disconnected`.
pub struct SmartMeter {
    host: String,
    port: String,
    interval_ms: i64,
    stream: Option<TcpStream>,
}

impl SmartMeter {
    /// Create a client for the meter at `address`, or discover one via
    /// its announcement multicast when no address is given. Discovery
    /// retries on timeout indefinitely.
    pub fn new(address: Option<&str>, port: &str, interval_ms: i64) -> Result<Self, MeterError> {
        let host = match address {
            Some(address) => address.to_string(),
            None => Self::discover()?.to_string(),
        };

        Ok(Self {
            host,
            port: port.to_string(),
            interval_ms,
            stream: None,
        })
    }

    /// The meter's resolved host or IP.
    pub fn address(&self) -> &str {
        &self.host
    }

    /// Listen for the meter's periodic announcement datagram; its source
    /// address is the meter.
    fn discover() -> Result<Ipv4Addr, MeterError> {
        let mut retries = 0u32;

        loop {
            let socket = crate::net::udp_broadcast_socket(
                DISCOVERY_PORT,
                Some(DISCOVERY_TIMEOUT),
                Some(DISCOVERY_GROUP),
            )?;

            let mut buf = [0u8; 16];
            match socket.recv_from(&mut buf) {
                Ok((_, source)) => {
                    if retries > 0 {
                        info!("found after retrying {retries} times");
                    }
                    if let IpAddr::V4(addr) = source.ip() {
                        info!("smart meter announced itself from {addr}");
                        return Ok(addr);
                    }
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    if retries == 0 {
                        warn!("waiting for smart meter announcement...");
                    }
                    retries += 1;
                }
                Err(e) => {
                    error!(
                        "failed to receive announcement: {e}; a multicast route may be missing"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    /// Perform one sample exchange. The meter drops the TCP connection
    /// after every response, so each sample connects afresh.
    pub fn measure(&mut self) -> Result<Measurement, MeterError> {
        let stream = self.connect()?;
        let result = Self::exchange(stream);
        self.disconnect();
        result
    }

    /// One sampler tick; failures are logged and the tick is skipped.
    pub fn sample(&mut self) -> Option<Measurement> {
        match self.measure() {
            Ok(measurement) => Some(measurement),
            Err(e) => {
                error!("failed to perform measurement: {e}");
                None
            }
        }
    }

    fn connect(&mut self) -> Result<&mut TcpStream, MeterError> {
        let stream = match self.stream.take() {
            Some(stream) => {
                debug!("connection already established");
                stream
            }
            None => crate::net::tcp_client_socket(&self.host, &self.port, self.read_timeout())?,
        };

        Ok(self.stream.insert(stream))
    }

    fn disconnect(&mut self) {
        self.stream = None;
    }

    fn read_timeout(&self) -> Option<Duration> {
        if self.interval_ms > 0 {
            Some(Duration::from_millis(self.interval_ms as u64))
        } else {
            None
        }
    }

    fn exchange(stream: &mut TcpStream) -> Result<Measurement, MeterError> {
        Self::send_request(stream)?;

        let mut measurement = Measurement::new();
        measurement[VarId::Timestamp] = clock::epoch_seconds() as f64;

        let mut buf = [0u8; MTU];
        let received = stream.read(&mut buf)?;
        debug!("bytes received: {received}");

        if received == 0 {
            return Err(MeterError::PeerClosed);
        }
        if received < 2 * transport::ENVELOPE {
            return Err(MeterError::ShortResponse(received));
        }

        let file = File::parse(&buf[transport::ENVELOPE..received - transport::ENVELOPE])?;

        // timestamp plus every slot the response tree filled
        let measured = 1 + Self::collect_readings(&file, &mut measurement);
        if measured < NUM_VARIABLES {
            warn!("only {measured} of {NUM_VARIABLES} variables measured");
            return Err(MeterError::Partial {
                got: measured,
                expected: NUM_VARIABLES,
            });
        }

        Ok(measurement)
    }

    fn send_request(stream: &mut TcpStream) -> Result<(), MeterError> {
        let bytes = transport::frame(&Self::request_file()?.to_bytes());
        stream.write_all(&bytes)?;
        Ok(())
    }

    /// The fixed three-message request: open the session, ask for the
    /// measurand subtree, close the session.
    fn request_file() -> Result<File, gridpulse_sml::Error> {
        let mut file = File::new();

        file.add_message(Message::new(
            1,
            MessageBody::OpenRequest(OpenRequest {
                client_id: Some(OctetStr::from_hex(CLIENT_ID)?),
                req_file_id: OctetStr::from_hex(REQ_FILE_ID)?,
                server_id: Some(OctetStr::from_hex(BROADCAST_SERVER_ID)?),
                ..OpenRequest::default()
            }),
        ));

        file.add_message(Message::new(
            2,
            MessageBody::GetProcParameterRequest(GetProcParameterRequest {
                server_id: Some(OctetStr::from_hex(BROADCAST_SERVER_ID)?),
                parameter_tree_path: TreePath(vec![OctetStr::from_hex(PARAMETER_PATH)?]),
                ..GetProcParameterRequest::default()
            }),
        ));

        file.add_message(Message::new(
            3,
            MessageBody::CloseRequest(CloseRequest::default()),
        ));

        Ok(file)
    }

    /// Walk the reply's messages; the first proc-parameter response
    /// carries the readings. Returns the number of slots written.
    fn collect_readings(file: &File, measurement: &mut Measurement) -> usize {
        for message in &file.messages {
            trace!("message body {:#06x}", message.body.tag());

            if let MessageBody::GetProcParameterResponse(response) = &message.body {
                return Self::collect_tree(&response.parameter_tree, measurement);
            }
        }

        error!("reply carries no proc-parameter response");
        0
    }

    fn collect_tree(tree: &Tree, measurement: &mut Measurement) -> usize {
        let mut written = match &tree.parameter_value {
            Some(ProcParValue::PeriodEntry(entry)) => Self::collect_entry(entry, measurement),
            _ => 0,
        };

        for child in &tree.child_list {
            written += Self::collect_tree(child, measurement);
        }
        written
    }

    fn collect_entry(entry: &PeriodEntry, measurement: &mut Measurement) -> usize {
        let Some(value) = &entry.value else {
            return 0;
        };

        let mut scaled = value.to_f64();
        if let Some(scaler) = entry.scaler {
            scaled *= 10f64.powi(scaler as i32);
        }

        match obis::lookup(entry.obj_name.as_bytes()) {
            Some(id) => {
                measurement[id] = scaled;
                1
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use gridpulse_common::obis;
    use gridpulse_sml::{GetProcParameterResponse, Value};

    use super::*;

    /// A meter double: accepts one connection, reads the request, replies
    /// with `response` (if any), then closes the connection the way a
    /// real meter does.
    fn meter_stub(listener: TcpListener, response: Option<Vec<u8>>) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut request = vec![0u8; MTU];
            let n = stream.read(&mut request).unwrap();
            request.truncate(n);

            if let Some(bytes) = response {
                stream.write_all(&bytes).unwrap();
            }
            request
        })
    }

    fn full_response_bytes() -> Vec<u8> {
        let children = obis::TABLE
            .iter()
            .map(|(obj_name, _)| Tree {
                parameter_name: OctetStr::new(obj_name.to_vec()),
                parameter_value: Some(ProcParValue::PeriodEntry(PeriodEntry {
                    obj_name: OctetStr::new(obj_name.to_vec()),
                    unit: Some(27),
                    scaler: Some(-1),
                    value: Some(Value::Int(1234)),
                    value_signature: None,
                })),
                child_list: Vec::new(),
            })
            .collect();

        let response = GetProcParameterResponse {
            server_id: OctetStr::from_hex(BROADCAST_SERVER_ID).unwrap(),
            parameter_tree_path: TreePath(vec![OctetStr::from_hex(PARAMETER_PATH).unwrap()]),
            parameter_tree: Tree {
                parameter_name: OctetStr::from_hex(PARAMETER_PATH).unwrap(),
                parameter_value: None,
                child_list: children,
            },
        };

        let mut file = File::new();
        file.add_message(Message::new(
            1,
            MessageBody::GetProcParameterResponse(response),
        ));
        transport::frame(&file.to_bytes())
    }

    fn local_meter(response: Option<Vec<u8>>) -> (SmartMeter, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port().to_string();
        let stub = meter_stub(listener, response);

        let meter = SmartMeter::new(Some("127.0.0.1"), &port, 1000).unwrap();
        (meter, stub)
    }

    #[test]
    fn full_response_fills_every_slot() {
        let (mut meter, stub) = local_meter(Some(full_response_bytes()));

        let measurement = meter.measure().unwrap();

        // every OBIS slot got 1234 * 10^-1
        for (_, id) in obis::TABLE {
            assert_eq!(measurement[id], 123.4, "{id:?}");
        }
        assert!(measurement[VarId::Timestamp] > 0.0);

        // the request the stub saw is a well-formed three-message file
        let request = stub.join().unwrap();
        let inner = &request[transport::ENVELOPE..request.len() - transport::ENVELOPE];
        let file = File::parse(inner).unwrap();
        assert_eq!(file.messages.len(), 3);
        assert!(matches!(file.messages[0].body, MessageBody::OpenRequest(_)));
        assert!(matches!(
            file.messages[1].body,
            MessageBody::GetProcParameterRequest(_)
        ));
        assert!(matches!(file.messages[2].body, MessageBody::CloseRequest(_)));
    }

    #[test]
    fn orderly_shutdown_fails_the_tick() {
        let (mut meter, stub) = local_meter(None);

        match meter.measure() {
            Err(MeterError::PeerClosed) => {}
            other => panic!("expected PeerClosed, got {other:?}"),
        }
        stub.join().unwrap();

        // a fresh connection succeeds on the next tick
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        meter.port = listener.local_addr().unwrap().port().to_string();
        let stub = meter_stub(listener, Some(full_response_bytes()));

        assert!(meter.measure().is_ok());
        stub.join().unwrap();
    }

    #[test]
    fn partial_response_is_rejected() {
        // a response covering a single measurand
        let entry = &obis::TABLE[1];
        let response = GetProcParameterResponse {
            server_id: OctetStr::from_hex(BROADCAST_SERVER_ID).unwrap(),
            parameter_tree_path: TreePath(Vec::new()),
            parameter_tree: Tree {
                parameter_name: OctetStr::new(entry.0.to_vec()),
                parameter_value: Some(ProcParValue::PeriodEntry(PeriodEntry {
                    obj_name: OctetStr::new(entry.0.to_vec()),
                    unit: None,
                    scaler: None,
                    value: Some(Value::UInt(42)),
                    value_signature: None,
                })),
                child_list: Vec::new(),
            },
        };
        let mut file = File::new();
        file.add_message(Message::new(
            1,
            MessageBody::GetProcParameterResponse(response),
        ));

        let (mut meter, stub) = local_meter(Some(transport::frame(&file.to_bytes())));

        match meter.measure() {
            Err(MeterError::Partial { got: 2, expected }) => {
                assert_eq!(expected, NUM_VARIABLES);
            }
            other => panic!("expected a partial measurement, got {other:?}"),
        }
        stub.join().unwrap();
    }

    #[test]
    fn each_sample_opens_a_fresh_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port().to_string();

        let server = thread::spawn(move || {
            let mut peers = Vec::new();
            for _ in 0..3 {
                let (mut stream, peer) = listener.accept().unwrap();
                let mut buf = vec![0u8; MTU];
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0);

                stream.write_all(&full_response_bytes()).unwrap();
                peers.push(peer);
            }
            peers
        });

        let mut meter = SmartMeter::new(Some("127.0.0.1"), &port, 1000).unwrap();
        for _ in 0..3 {
            meter.measure().unwrap();
        }

        let peers = server.join().unwrap();
        assert_eq!(peers.len(), 3);
        // three distinct ephemeral source ports: three distinct connections
        assert!(peers[0].port() != peers[1].port() || peers[1].port() != peers[2].port());
    }

    #[test]
    fn scaler_defaults_to_unity() {
        let mut measurement = Measurement::new();
        let entry = PeriodEntry {
            obj_name: OctetStr::new(obis::TABLE[0].0.to_vec()),
            unit: None,
            scaler: None,
            value: Some(Value::Int(250)),
            value_signature: None,
        };

        assert_eq!(SmartMeter::collect_entry(&entry, &mut measurement), 1);
        assert_eq!(measurement[VarId::PowerAllPhases], 250.0);
    }

    #[test]
    fn entries_without_values_or_unknown_names_do_not_count() {
        let mut measurement = Measurement::new();

        let no_value = PeriodEntry {
            obj_name: OctetStr::new(obis::TABLE[0].0.to_vec()),
            ..PeriodEntry::default()
        };
        assert_eq!(SmartMeter::collect_entry(&no_value, &mut measurement), 0);

        let unknown = PeriodEntry {
            obj_name: OctetStr::new(vec![0x09, 0x09, 0x09, 0x09, 0x09, 0x09]),
            value: Some(Value::Int(1)),
            ..PeriodEntry::default()
        };
        assert_eq!(SmartMeter::collect_entry(&unknown, &mut measurement), 0);
        assert_eq!(measurement, Measurement::new());
    }
}
