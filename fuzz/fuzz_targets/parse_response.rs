#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use cubrid_protocol::{
    BatchResult, ExecuteReply, NextResultReply, OutResultSetReply, PrepareReply, Response,
};
use libfuzzer_sys::fuzz_target;

/// Which reply decoder to run over the frame body.
#[derive(Debug, Arbitrary)]
enum Reply {
    Prepare,
    Execute,
    NextResult,
    OutResultSet,
    Batch,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    reply: Reply,
    frame: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(response) = Response::from_frame(Bytes::from(input.frame)) else {
        return;
    };
    let code = response.code();
    let mut body = response.into_body();

    match input.reply {
        Reply::Prepare => {
            let _ = PrepareReply::decode(code, &mut body);
        }
        Reply::Execute => {
            let _ = ExecuteReply::decode(code, &mut body);
        }
        Reply::NextResult => {
            let _ = NextResultReply::decode(&mut body);
        }
        Reply::OutResultSet => {
            let _ = OutResultSetReply::decode(&mut body);
        }
        Reply::Batch => {
            if let Ok(count) = body.read_i32() {
                let _ = BatchResult::decode_list(&mut body, count.min(1024));
            }
        }
    }
});
