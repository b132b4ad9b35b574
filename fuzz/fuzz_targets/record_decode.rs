#![no_main]

use hgbridge::changegroup::{DeltaBases, Layout, Parents, RawRevChunk};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let bases = DeltaBases::default();
    for layout in [Layout::V1, Layout::V2] {
        let record = RawRevChunk::from_bytes(layout, data.to_vec());
        let decoded = record.decode(&bases);
        if data.len() >= layout.header_len() {
            let revision = decoded.expect("full headers always decode");
            assert_eq!(record.parents().expect("parents").len(), revision_parents(&revision));
        } else {
            assert!(decoded.is_err());
        }
    }
});

fn revision_parents(revision: &hgbridge::Revision) -> usize {
    [revision.parent1, revision.parent2]
        .iter()
        .filter(|p| !p.is_null())
        .count()
}
