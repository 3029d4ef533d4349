#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use cubrid_protocol::{ColumnType, ResponseReader};
use libfuzzer_sys::fuzz_target;

/// Fuzz input: a declared column type byte plus the raw value bytes.
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    type_byte: u8,
    runtime_typed: bool,
    data: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let declared = ColumnType::from_raw(input.type_byte).data_type;
    let mut reader = ResponseReader::new(Bytes::from(input.data));
    let _ = cubrid_types::read_value(&mut reader, declared, input.runtime_typed);
});
