//! TensorBoard event files (`events.out.tfevents.*`).
//!
//! An event file is a sequence of TFRecord frames:
//!
//! ```text
//! u64 LE payload length | u32 masked crc32c(length) | payload | u32 masked crc32c(payload)
//! ```
//!
//! Each payload is a protobuf `Event`. Only the fields needed for scalar
//! summaries are modelled; prost skips everything else.

use crate::error::{TrainingError, TrainingResult};
use crate::metrics::ScalarSeries;
use prost::Message;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// File name prefix shared by every event log shard.
pub const EVENT_FILE_PREFIX: &str = "events.out.tfevents.";

const HEADER_LEN: usize = 12;
const FOOTER_LEN: usize = 4;
const CRC_MASK_DELTA: u32 = 0xa282_ead8;
const SCALARS_PLUGIN: &str = "scalars";
const DT_FLOAT: i32 = 1;
const DT_DOUBLE: i32 = 2;

pub mod proto {
    //! Subset of `tensorflow/core/util/event.proto` and `summary.proto`.

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Event {
        #[prost(double, tag = "1")]
        pub wall_time: f64,
        #[prost(int64, tag = "2")]
        pub step: i64,
        #[prost(oneof = "event::What", tags = "3, 5")]
        pub what: ::core::option::Option<event::What>,
    }

    pub mod event {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum What {
            #[prost(string, tag = "3")]
            FileVersion(::prost::alloc::string::String),
            #[prost(message, tag = "5")]
            Summary(super::Summary),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Summary {
        #[prost(message, repeated, tag = "1")]
        pub value: ::prost::alloc::vec::Vec<SummaryValue>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SummaryValue {
        #[prost(string, tag = "1")]
        pub tag: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "9")]
        pub metadata: ::core::option::Option<SummaryMetadata>,
        #[prost(oneof = "summary_value::Value", tags = "2, 8")]
        pub value: ::core::option::Option<summary_value::Value>,
    }

    pub mod summary_value {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Value {
            #[prost(float, tag = "2")]
            SimpleValue(f32),
            #[prost(message, tag = "8")]
            Tensor(super::TensorProto),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SummaryMetadata {
        #[prost(message, optional, tag = "1")]
        pub plugin_data: ::core::option::Option<PluginData>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PluginData {
        #[prost(string, tag = "1")]
        pub plugin_name: ::prost::alloc::string::String,
        #[prost(bytes = "vec", tag = "2")]
        pub content: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TensorProto {
        #[prost(int32, tag = "1")]
        pub dtype: i32,
        #[prost(bytes = "vec", tag = "4")]
        pub tensor_content: ::prost::alloc::vec::Vec<u8>,
        #[prost(float, repeated, tag = "5")]
        pub float_val: ::prost::alloc::vec::Vec<f32>,
        #[prost(double, repeated, tag = "6")]
        pub double_val: ::prost::alloc::vec::Vec<f64>,
    }
}

use proto::event::What;
use proto::summary_value::Value;

/// Returns true when `path` names an event log shard.
#[must_use]
pub fn is_event_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(EVENT_FILE_PREFIX))
}

/// Reads every scalar in one event file, keyed by tag, in emission order.
///
/// A truncated trailing frame ends the read with a warning; the frames before it
/// are kept. Checksum mismatches and undecodable payloads fail the whole file.
pub fn read_scalars(path: &Path) -> TrainingResult<BTreeMap<String, ScalarSeries>> {
    let bytes = std::fs::read(path).map_err(|e| TrainingError::log_read(path, e.to_string()))?;
    let mut series: BTreeMap<String, ScalarSeries> = BTreeMap::new();
    let mut offset = 0usize;
    let mut records = 0usize;

    while offset < bytes.len() {
        let Some(payload) = next_record(path, &bytes, offset)? else {
            warn!(path = %path.display(), offset, "Event file ends with a truncated record, ignoring the tail");
            break;
        };
        offset += HEADER_LEN + payload.len() + FOOTER_LEN;
        records += 1;

        let event = proto::Event::decode(payload).map_err(|e| {
            TrainingError::log_read(path, format!("record {records} is not a valid event: {e}"))
        })?;

        if let Some(What::Summary(summary)) = event.what {
            for value in summary.value {
                if let Some(scalar) = scalar_value(&value) {
                    series
                        .entry(value.tag.clone())
                        .or_insert_with(|| ScalarSeries::new(value.tag.clone()))
                        .push(event.step, scalar);
                }
            }
        }
    }

    debug!(path = %path.display(), records, tags = series.len(), "Read event file");
    Ok(series)
}

/// Slices out the payload of the frame at `offset`, or `None` if the file ends mid-frame.
fn next_record<'a>(path: &Path, bytes: &'a [u8], offset: usize) -> TrainingResult<Option<&'a [u8]>> {
    let rest = &bytes[offset..];
    if rest.len() < HEADER_LEN {
        return Ok(None);
    }

    let (len_bytes, len_crc) = rest[..HEADER_LEN].split_at(8);
    if masked_crc32c(len_bytes) != read_u32(len_crc) {
        return Err(TrainingError::log_read(path, format!("length checksum mismatch at byte {offset}")));
    }

    let len = u64::from_le_bytes(len_bytes.try_into().map_err(|_| {
        TrainingError::log_read(path, format!("short length field at byte {offset}"))
    })?);
    let len = usize::try_from(len)
        .map_err(|_| TrainingError::log_read(path, format!("record length {len} at byte {offset} is too large")))?;

    let Some(frame_end) = HEADER_LEN.checked_add(len).and_then(|n| n.checked_add(FOOTER_LEN)) else {
        return Err(TrainingError::log_read(path, format!("record length {len} at byte {offset} is too large")));
    };
    if rest.len() < frame_end {
        return Ok(None);
    }

    let payload = &rest[HEADER_LEN..HEADER_LEN + len];
    if masked_crc32c(payload) != read_u32(&rest[HEADER_LEN + len..frame_end]) {
        return Err(TrainingError::log_read(path, format!("payload checksum mismatch at byte {offset}")));
    }

    Ok(Some(payload))
}

fn scalar_value(value: &proto::SummaryValue) -> Option<f64> {
    match value.value.as_ref()? {
        Value::SimpleValue(v) => Some(f64::from(*v)),
        Value::Tensor(tensor) => {
            let plugin = value.metadata.as_ref()?.plugin_data.as_ref()?;
            if plugin.plugin_name == SCALARS_PLUGIN {
                tensor_scalar(tensor)
            } else {
                None
            }
        }
    }
}

fn tensor_scalar(tensor: &proto::TensorProto) -> Option<f64> {
    match tensor.dtype {
        DT_FLOAT => tensor.float_val.first().map(|v| f64::from(*v)).or_else(|| {
            let raw: [u8; 4] = tensor.tensor_content.get(..4)?.try_into().ok()?;
            Some(f64::from(f32::from_le_bytes(raw)))
        }),
        DT_DOUBLE => tensor.double_val.first().copied().or_else(|| {
            let raw: [u8; 8] = tensor.tensor_content.get(..8)?.try_into().ok()?;
            Some(f64::from_le_bytes(raw))
        }),
        _ => None,
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

/// Frames `payload` as one TFRecord.
#[must_use]
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u64).to_le_bytes();
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    frame.extend_from_slice(&len);
    frame.extend_from_slice(&masked_crc32c(&len).to_le_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&masked_crc32c(payload).to_le_bytes());
    frame
}

/// Appends scalar summaries to a new event file.
pub struct EventFileWriter {
    out: BufWriter<File>,
}

impl EventFileWriter {
    /// Creates `path` and writes the leading `file_version` event.
    pub fn create(path: impl Into<PathBuf>) -> TrainingResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = Self { out: BufWriter::new(File::create(&path)?) };
        writer.write_event(&proto::Event {
            wall_time: wall_time(),
            step: 0,
            what: Some(What::FileVersion("brain.Event:2".to_string())),
        })?;
        Ok(writer)
    }

    pub fn add_scalar(&mut self, tag: &str, step: i64, value: f32) -> TrainingResult<()> {
        let summary = proto::Summary {
            value: vec![proto::SummaryValue {
                tag: tag.to_string(),
                metadata: None,
                value: Some(Value::SimpleValue(value)),
            }],
        };
        self.write_event(&proto::Event { wall_time: wall_time(), step, what: Some(What::Summary(summary)) })
    }

    pub fn write_event(&mut self, event: &proto::Event) -> TrainingResult<()> {
        self.out.write_all(&encode_record(&event.encode_to_vec()))?;
        Ok(())
    }

    pub fn flush(&mut self) -> TrainingResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn wall_time() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or_default()
}

// CRC-32C (Castagnoli), reflected polynomial.
const CRC32C_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ 0x82f6_3b78 } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

fn crc32c(bytes: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &b in bytes {
        crc = CRC32C_TABLE[((crc ^ u32::from(b)) & 0xff) as usize] ^ (crc >> 8);
    }
    !crc
}

fn masked_crc32c(bytes: &[u8]) -> u32 {
    let crc = crc32c(bytes);
    ((crc >> 15) | (crc << 17)).wrapping_add(CRC_MASK_DELTA)
}
