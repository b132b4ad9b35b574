#![no_main]

use hgbridge::changegroup::patch::{apply, diff, Patch};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.first().map(|b| *b as usize).unwrap_or(0).min(data.len());
    let (base, patch) = data.split_at(split);

    let streamed = apply(base, patch);
    let decoded = Patch::decode(patch).and_then(|p| p.apply(base));
    assert_eq!(streamed.is_ok(), decoded.is_ok());
    if let (Ok(a), Ok(b)) = (&streamed, &decoded) {
        assert_eq!(a, b);
    }

    let roundtrip = diff(base, patch).expect("diff");
    assert_eq!(apply(base, &roundtrip).expect("apply diff"), patch);
});
