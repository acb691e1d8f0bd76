#![no_main]
use cast_memory::{validate_casts, RawCast};
use libfuzzer_sys::fuzz_target;

// Arbitrary feed payloads must never panic the validator.
fuzz_target!(|data: &[u8]| {
    if let Ok(casts) = serde_json::from_slice::<Vec<RawCast>>(data) {
        let (valid, skipped) = validate_casts(&casts);
        assert_eq!(valid.len() + skipped.len(), casts.len());
    }
});
