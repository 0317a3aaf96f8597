#![no_main]

use cardinality_sketch::HyperLogLog;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Classification must never panic, whatever the bytes.
    let _ = HyperLogLog::is_valid(data);

    if let Ok(sketch) = HyperLogLog::from_bytes(data) {
        let estimate = sketch.estimate_cardinality();
        let bytes = sketch.to_bytes();
        assert!(HyperLogLog::is_valid(&bytes));

        let reloaded = HyperLogLog::from_bytes(&bytes).expect("re-encoded sketch must decode");
        assert_eq!(reloaded.estimate_cardinality(), estimate);
        assert_eq!(reloaded.to_bytes(), bytes);
    }
});
