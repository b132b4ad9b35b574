#![no_main]

use hgbridge::changegroup::{ChunkReader, Layout};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for layout in [Layout::V1, Layout::V2] {
        if let Ok(cg) = ChunkReader::new(data, layout).read_changegroup() {
            let _ = cg.revisions();
        }
    }
});
