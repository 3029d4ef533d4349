//! Benchmarks for value encoding and decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{BufMut, BytesMut};
use chrono::NaiveDate;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use cubrid_protocol::{DataType, FunctionCode, RequestWriter, ResponseReader};
use cubrid_types::{SqlValue, decode_value, encode_value, read_value};

/// Benchmark encoding a mixed parameter row.
fn bench_encode_row(c: &mut Criterion) {
    let row = [
        SqlValue::Int(1),
        SqlValue::String("ado.net provider".into()),
        SqlValue::Double(8373625.383635235),
        SqlValue::Date(NaiveDate::from_ymd_opt(2008, 12, 24).unwrap()),
    ];
    let mut writer = RequestWriter::new();

    c.bench_function("encode_row", |b| {
        b.iter(|| {
            writer.begin_request(FunctionCode::Execute);
            for value in &row {
                writer.write_type_arg(value.data_type());
                encode_value(&mut writer, DataType::Null, black_box(value)).unwrap();
            }
            black_box(writer.finish())
        })
    });
}

/// Benchmark decoding a 100-element sequence.
fn bench_decode_collection(c: &mut Criterion) {
    let mut buf = BytesMut::new();
    buf.put_u8(DataType::Int as u8);
    buf.put_i32(100);
    for i in 0..100 {
        buf.put_i32(4);
        buf.put_i32(i);
    }
    let size = buf.len() as i32;
    let encoded = buf.freeze();

    c.bench_function("decode_sequence_100", |b| {
        b.iter(|| {
            let mut reader = ResponseReader::new(encoded.clone());
            black_box(decode_value(&mut reader, DataType::Sequence, size).unwrap())
        })
    });
}

/// Benchmark reading runtime-typed values.
fn bench_read_runtime_typed(c: &mut Criterion) {
    let mut buf = BytesMut::new();
    for i in 0..64 {
        buf.put_i32(5);
        buf.put_u8(DataType::Int as u8);
        buf.put_i32(i);
    }
    let encoded = buf.freeze();

    c.bench_function("read_runtime_typed_64", |b| {
        b.iter(|| {
            let mut reader = ResponseReader::new(encoded.clone());
            for _ in 0..64 {
                black_box(read_value(&mut reader, DataType::Null, true).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    bench_encode_row,
    bench_decode_collection,
    bench_read_runtime_typed,
);

criterion_main!(benches);
