//! Common test utilities for driver tests
//!
//! Provides:
//! - A scripted in-memory server speaking the wire protocol
//! - Builders for descriptor streams and encoded result rows

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use uuid::Uuid;

use edgewire::descriptor::{tag, ScalarType, EMPTY_TUPLE_ID};
use edgewire::driver::protocol::{frame_len, pop_message, Cardinality, RawMessage, Reader, Writer};
use edgewire::{ClientConfig, CodecCache, Connection, ConnectionBuilder};

const MAX: usize = 1 << 20;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Descriptors and rows
// ============================================================================

/// Writes a descriptor stream, handing back each record's position.
pub struct Descriptors {
    w: Writer,
    count: u16,
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            w: Writer::new(),
            count: 0,
        }
    }

    fn record(&mut self, kind: u8, id: &Uuid) -> u16 {
        self.w.push_u8(kind);
        self.w.push_uuid(id);
        self.count += 1;
        self.count - 1
    }

    pub fn scalar(&mut self, kind: ScalarType) -> u16 {
        self.record(tag::BASE_SCALAR, &kind.base_id())
    }

    pub fn object(&mut self, id: Uuid, fields: &[(&str, Cardinality, u32, u16)]) -> u16 {
        let pos = self.record(tag::OBJECT_SHAPE, &id);
        self.w.push_u16(fields.len() as u16);
        for (name, card, flags, child) in fields {
            self.w.push_u32(*flags);
            self.w.push_u8(*card as u8);
            self.w.push_string(name);
            self.w.push_u16(*child);
        }
        pos
    }

    pub fn tuple(&mut self, id: Uuid, elements: &[u16]) -> u16 {
        let pos = self.record(tag::TUPLE, &id);
        self.w.push_u16(elements.len() as u16);
        for el in elements {
            self.w.push_u16(*el);
        }
        pos
    }

    pub fn named_tuple(&mut self, id: Uuid, elements: &[(&str, u16)]) -> u16 {
        let pos = self.record(tag::NAMED_TUPLE, &id);
        self.w.push_u16(elements.len() as u16);
        for (name, el) in elements {
            self.w.push_string(name);
            self.w.push_u16(*el);
        }
        pos
    }

    pub fn array(&mut self, id: Uuid, element: u16) -> u16 {
        let pos = self.record(tag::ARRAY, &id);
        self.w.push_u16(element);
        self.w.push_u16(1);
        self.w.push_i32(-1);
        pos
    }

    pub fn set(&mut self, id: Uuid, element: u16) -> u16 {
        let pos = self.record(tag::SET, &id);
        self.w.push_u16(element);
        pos
    }

    pub fn enumeration(&mut self, id: Uuid, members: &[&str]) -> u16 {
        let pos = self.record(tag::ENUM, &id);
        self.w.push_u16(members.len() as u16);
        for m in members {
            self.w.push_string(m);
        }
        pos
    }

    pub fn annotation(&mut self, text: &str) -> u16 {
        let pos = self.record(0xFF, &Uuid::new_v4());
        self.w.push_string(text);
        pos
    }

    pub fn finish(self) -> Vec<u8> {
        self.w.as_slice().to_vec()
    }
}

/// Object or tuple payload from element payloads; `None` is a missing element.
pub fn compound(elements: &[Option<Vec<u8>>]) -> Vec<u8> {
    let mut w = Writer::new();
    w.push_u32(elements.len() as u32);
    for el in elements {
        w.push_u32(0);
        match el {
            Some(data) => w.push_bytes(data),
            None => w.push_u32(0xFFFF_FFFF),
        }
    }
    w.as_slice().to_vec()
}

/// One-dimensional array payload.
pub fn array(elements: &[Vec<u8>]) -> Vec<u8> {
    let mut w = Writer::new();
    if elements.is_empty() {
        w.push_u32(0);
        w.push_u32(0);
        w.push_u32(0);
        return w.as_slice().to_vec();
    }
    w.push_u32(1);
    w.push_u32(0);
    w.push_u32(0);
    w.push_u32(elements.len() as u32);
    w.push_u32(1);
    for el in elements {
        w.push_bytes(el);
    }
    w.as_slice().to_vec()
}

pub fn int64(v: i64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn int32(v: i32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn text(v: &str) -> Vec<u8> {
    v.as_bytes().to_vec()
}

// ============================================================================
// Scripted server
// ============================================================================

#[derive(Debug, Clone)]
pub struct Statement {
    pub cardinality: Cardinality,
    pub input_id: Uuid,
    pub input: Vec<u8>,
    pub output_id: Uuid,
    pub output: Vec<u8>,
    pub rows: Vec<Vec<u8>>,
    /// Reply to execution with this `(code, message)` instead of rows
    pub error: Option<(u32, String)>,
}

impl Statement {
    /// A statement without arguments.
    pub fn new(output_id: Uuid, output: Vec<u8>) -> Self {
        Self {
            cardinality: Cardinality::Many,
            input_id: EMPTY_TUPLE_ID,
            input: Vec::new(),
            output_id,
            output,
            rows: Vec::new(),
            error: None,
        }
    }

    pub fn input(mut self, input_id: Uuid, input: Vec<u8>) -> Self {
        self.input_id = input_id;
        self.input = input;
        self
    }

    pub fn rows(mut self, rows: Vec<Vec<u8>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn error(mut self, code: u32, message: &str) -> Self {
        self.error = Some((code, message.to_string()));
        self
    }
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub statements: HashMap<String, Statement>,
    /// Client message types in arrival order, `Sync` excluded
    pub received: Vec<u8>,
    pub last_arguments: Option<Vec<u8>>,
    pub scripts: Vec<String>,
    /// Raw bytes sent before the next `ReadyForCommand`
    pub inject: Option<Vec<u8>>,
    /// Never answer
    pub silent: bool,
    /// Wait this long before each reply
    pub delay_ms: Option<u64>,
}

pub type Shared = Arc<Mutex<ServerState>>;

pub fn server(statements: Vec<(&str, Statement)>) -> Shared {
    let state = ServerState {
        statements: statements
            .into_iter()
            .map(|(cmd, st)| (cmd.to_string(), st))
            .collect(),
        ..ServerState::default()
    };
    Arc::new(Mutex::new(state))
}

/// Messages received since the last call, as ASCII type codes.
pub fn take_received(state: &Shared) -> String {
    let mut state = state.lock().unwrap();
    let received = String::from_utf8(state.received.clone()).unwrap();
    state.received.clear();
    received
}

pub fn connect(state: &Shared, cache: Arc<CodecCache>) -> Connection<DuplexStream> {
    connect_with(state, cache, ClientConfig::default())
}

pub fn connect_with(
    state: &Shared,
    cache: Arc<CodecCache>,
    config: ClientConfig,
) -> Connection<DuplexStream> {
    let (client, server_end) = tokio::io::duplex(64 * 1024);
    tokio::spawn(serve(server_end, state.clone()));
    ConnectionBuilder::new()
        .config(config)
        .cache(cache)
        .build(client)
        .unwrap()
}

fn message(out: &mut Vec<u8>, mtype: u8, payload: &[u8]) {
    out.push(mtype);
    out.extend_from_slice(&(payload.len() as u32 + 4).to_be_bytes());
    out.extend_from_slice(payload);
}

fn prepare_complete(out: &mut Vec<u8>, st: &Statement) {
    let mut w = Writer::new();
    w.push_u16(0);
    w.push_u8(st.cardinality as u8);
    w.push_uuid(&st.input_id);
    w.push_uuid(&st.output_id);
    message(out, b'1', w.as_slice());
}

fn data_description(out: &mut Vec<u8>, st: &Statement) {
    let mut w = Writer::new();
    w.push_u16(0);
    w.push_u8(st.cardinality as u8);
    w.push_uuid(&st.input_id);
    w.push_bytes(&st.input);
    w.push_uuid(&st.output_id);
    w.push_bytes(&st.output);
    message(out, b'T', w.as_slice());
}

fn error_response(out: &mut Vec<u8>, code: u32, text: &str) {
    let mut w = Writer::new();
    w.push_u8(120);
    w.push_u32(code);
    w.push_string(text);
    w.push_u16(0);
    message(out, b'E', w.as_slice());
}

fn command_complete(out: &mut Vec<u8>, status: &str) {
    let mut w = Writer::new();
    w.push_u16(0);
    w.push_string(status);
    message(out, b'C', w.as_slice());
}

fn results(out: &mut Vec<u8>, st: &Statement) {
    if let Some((code, text)) = &st.error {
        error_response(out, *code, text);
        return;
    }
    for row in &st.rows {
        let mut w = Writer::new();
        w.push_u16(1);
        w.push_bytes(row);
        message(out, b'D', w.as_slice());
    }
    command_complete(out, "SELECT");
}

fn handle(state: &Shared, prepared: &mut Option<String>, msg: RawMessage, out: &mut Vec<u8>) {
    let mut state = state.lock().unwrap();
    let mut r: Reader<'_> = msg.reader();
    if msg.mtype != b'S' {
        state.received.push(msg.mtype);
    }

    match msg.mtype {
        b'P' => {
            r.skip_headers().unwrap();
            r.discard(2).unwrap();
            r.pop_bytes().unwrap();
            let command = r.pop_string().unwrap();
            match state.statements.get(&command) {
                Some(st) => {
                    prepare_complete(out, st);
                    *prepared = Some(command);
                }
                None => error_response(out, 0x0401_0000, "unknown statement"),
            }
        }
        b'D' => {
            let st = prepared.as_ref().and_then(|c| state.statements.get(c));
            match st {
                Some(st) => data_description(out, st),
                None => error_response(out, 0x0401_0000, "nothing prepared"),
            }
        }
        b'E' => {
            r.skip_headers().unwrap();
            r.pop_bytes().unwrap();
            let args = r.pop_bytes().unwrap().to_vec();
            state.last_arguments = Some(args);
            let st = prepared.as_ref().and_then(|c| state.statements.get(c)).cloned();
            match st {
                Some(st) => results(out, &st),
                None => error_response(out, 0x0401_0000, "nothing prepared"),
            }
        }
        b'O' => {
            r.skip_headers().unwrap();
            r.discard(2).unwrap();
            let command = r.pop_string().unwrap();
            let input_id = r.pop_uuid().unwrap();
            let output_id = r.pop_uuid().unwrap();
            let args = r.pop_bytes().unwrap().to_vec();
            state.last_arguments = Some(args);
            let st = state.statements.get(&command).cloned();
            match st {
                Some(st) if st.input_id == input_id && st.output_id == output_id => {
                    results(out, &st)
                }
                Some(st) => {
                    data_description(out, &st);
                    *prepared = Some(command);
                }
                None => error_response(out, 0x0401_0000, "unknown statement"),
            }
        }
        b'Q' => {
            r.skip_headers().unwrap();
            let script = r.pop_string().unwrap();
            if script.contains("fail") {
                error_response(out, 0x0400_0000, "script failed");
            } else {
                command_complete(out, "SCRIPT");
            }
            state.scripts.push(script);
        }
        b'S' => {
            if let Some(raw) = state.inject.take() {
                out.extend_from_slice(&raw);
            }
            message(out, b'Z', &[0, 0, b'I']);
        }
        other => panic!("unexpected client message 0x{:02x}", other),
    }
}

async fn serve(mut stream: DuplexStream, state: Shared) {
    let mut buf = BytesMut::new();
    let mut prepared = None;
    loop {
        let mut out = Vec::new();
        while let Ok(Some(_)) = frame_len(&buf, MAX) {
            let msg = pop_message(&mut buf, MAX).unwrap();
            handle(&state, &mut prepared, msg, &mut out);
        }
        let (silent, delay_ms) = {
            let state = state.lock().unwrap();
            (state.silent, state.delay_ms)
        };
        if let Some(ms) = delay_ms.filter(|_| !out.is_empty()) {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        if !out.is_empty() && !silent {
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }
        match stream.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// A server log message followed by raw bytes of `extra`.
pub fn log_message(text: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.push_u8(60);
    w.push_u32(0);
    w.push_string(text);
    w.push_u16(0);
    let mut out = Vec::new();
    message(&mut out, b'L', w.as_slice());
    out
}

pub fn raw_message(mtype: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    message(&mut out, mtype, payload);
    out
}
