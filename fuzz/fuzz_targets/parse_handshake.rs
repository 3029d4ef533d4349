#![no_main]

use cubrid_protocol::{BROKER_INFO_SIZE, BrokerInfo, DbInfo, DriverInfo, PortReply};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = DriverInfo::decode(data);
    let _ = DbInfo::decode(data);

    if let Some(head) = data.get(..4) {
        let raw = i32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        if let Ok(reply) = PortReply::from_i32(raw) {
            assert_eq!(reply.to_i32(), raw);
        }
    }

    if let Some(block) = data.get(..BROKER_INFO_SIZE) {
        let mut info = [0u8; BROKER_INFO_SIZE];
        info.copy_from_slice(block);
        let _ = BrokerInfo::decode(info);
    }
});
