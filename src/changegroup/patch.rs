//! Binary delta patches.
//!
//! A patch is a sequence of hunks `start: u32be, end: u32be, len: u32be,
//! data[len]`, each replacing `base[start..end]` with `data`. Offsets always
//! refer to the base text, so hunks must be ordered and must not overlap.

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::primitives::bytes::{be, buf::Cursor};

/// Size of a hunk header.
pub const HUNK_HEADER_LEN: usize = 12;

/// Edit-distance bound past which [`diff`] stops searching and emits a single
/// replacement hunk for the differing region.
pub const MAX_EDIT_COST: usize = 1024;

/// One hunk of a patch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchOp {
    /// First replaced byte of the base.
    pub start: u32,
    /// One past the last replaced byte of the base.
    pub end: u32,
    /// Replacement bytes.
    pub data: Vec<u8>,
}

/// A decoded, structurally valid patch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

fn next_hunk<'a>(cur: &mut Cursor<'a>, last_end: u32) -> Result<(u32, u32, &'a [u8])> {
    if cur.remaining() < HUNK_HEADER_LEN {
        return Err(BridgeError::truncated(
            "patch hunk header",
            HUNK_HEADER_LEN,
            cur.remaining(),
        ));
    }
    let start = cur.read_u32()?;
    let end = cur.read_u32()?;
    let len = cur.read_u32()? as usize;
    if start > end {
        return Err(BridgeError::malformed(format!(
            "patch hunk starts at {start} past its end {end}"
        )));
    }
    if start < last_end {
        return Err(BridgeError::malformed(format!(
            "patch hunk at {start} overlaps previous hunk ending at {last_end}"
        )));
    }
    let data = cur.take(len)?;
    Ok((start, end, data))
}

impl Patch {
    /// Parses and validates patch bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let mut ops = Vec::new();
        let mut last_end = 0;
        while !cur.is_empty() {
            let (start, end, data) = next_hunk(&mut cur, last_end)?;
            last_end = end;
            ops.push(PatchOp {
                start,
                end,
                data: data.to_vec(),
            });
        }
        Ok(Self { ops })
    }

    /// Builds a patch from hunks, checking order and overlap.
    pub fn from_ops(ops: Vec<PatchOp>) -> Result<Self> {
        let mut last_end = 0;
        for op in &ops {
            if op.start > op.end || op.start < last_end {
                return Err(BridgeError::malformed(format!(
                    "patch hunk {}..{} is out of order",
                    op.start, op.end
                )));
            }
            last_end = op.end;
        }
        Ok(Self { ops })
    }

    /// A patch that produces `text` from the empty base.
    pub fn full_text(text: &[u8]) -> Self {
        Self {
            ops: vec![PatchOp {
                start: 0,
                end: 0,
                data: text.to_vec(),
            }],
        }
    }

    /// Hunks in base order.
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// True for the identity patch.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Serializes back to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = self
            .ops
            .iter()
            .map(|op| HUNK_HEADER_LEN + op.data.len())
            .sum();
        let mut out = Vec::with_capacity(size);
        for op in &self.ops {
            be::put_u32(&mut out, op.start);
            be::put_u32(&mut out, op.end);
            be::put_u32(&mut out, be::to_u32(op.data.len(), "hunk length")?);
            out.extend_from_slice(&op.data);
        }
        Ok(out)
    }

    /// Applies the patch to `base`.
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(base.len());
        let mut pos = 0usize;
        for op in &self.ops {
            let (start, end) = (op.start as usize, op.end as usize);
            check_range(start, end, base.len())?;
            out.extend_from_slice(&base[pos..start]);
            out.extend_from_slice(&op.data);
            pos = end;
        }
        out.extend_from_slice(&base[pos..]);
        Ok(out)
    }
}

fn check_range(start: usize, end: usize, base_len: usize) -> Result<()> {
    if end > base_len {
        return Err(BridgeError::malformed(format!(
            "patch hunk {start}..{end} exceeds base of {base_len} bytes"
        )));
    }
    Ok(())
}

/// Applies raw patch bytes to `base` without materializing the hunk list.
pub fn apply(base: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let mut cur = Cursor::new(patch);
    let mut out = Vec::with_capacity(base.len() + patch.len());
    let mut pos = 0usize;
    while !cur.is_empty() {
        let (start, end, data) = next_hunk(&mut cur, pos as u32)?;
        let (start, end) = (start as usize, end as usize);
        check_range(start, end, base.len())?;
        out.extend_from_slice(&base[pos..start]);
        out.extend_from_slice(data);
        pos = end;
    }
    out.extend_from_slice(&base[pos..]);
    Ok(out)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Edit {
    Keep,
    Delete,
    Insert,
}

struct Lines<'a> {
    lines: Vec<&'a [u8]>,
    /// `offsets[i]` is the byte offset of line `i`; one extra entry for the end.
    offsets: Vec<usize>,
}

impl<'a> Lines<'a> {
    fn split(text: &'a [u8]) -> Self {
        let lines: Vec<&[u8]> = text.split_inclusive(|&b| b == b'\n').collect();
        let mut offsets = Vec::with_capacity(lines.len() + 1);
        let mut off = 0;
        offsets.push(off);
        for line in &lines {
            off += line.len();
            offsets.push(off);
        }
        Self { lines, offsets }
    }
}

/// Computes a line-based patch turning `old` into `new`.
///
/// Equal inputs produce an empty patch. Inputs whose edit distance exceeds
/// [`MAX_EDIT_COST`] lines get one hunk covering the differing region.
pub fn diff(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    if old == new {
        return Ok(Vec::new());
    }
    let a = Lines::split(old);
    let b = Lines::split(new);

    let prefix = a
        .lines
        .iter()
        .zip(&b.lines)
        .take_while(|(x, y)| x == y)
        .count();
    let suffix = a.lines[prefix..]
        .iter()
        .rev()
        .zip(b.lines[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let a_mid = &a.lines[prefix..a.lines.len() - suffix];
    let b_mid = &b.lines[prefix..b.lines.len() - suffix];

    let mut ops = Vec::new();
    match shortest_edit(a_mid, b_mid) {
        Some(edits) => {
            let mut ai = prefix;
            let mut bi = prefix;
            let mut open: Option<(usize, usize)> = None;
            for edit in edits {
                match edit {
                    Edit::Keep => {
                        if let Some((a0, b0)) = open.take() {
                            ops.push(hunk(&a, &b, a0..ai, b0..bi)?);
                        }
                        ai += 1;
                        bi += 1;
                    }
                    Edit::Delete => {
                        open.get_or_insert((ai, bi));
                        ai += 1;
                    }
                    Edit::Insert => {
                        open.get_or_insert((ai, bi));
                        bi += 1;
                    }
                }
            }
            if let Some((a0, b0)) = open {
                ops.push(hunk(&a, &b, a0..ai, b0..bi)?);
            }
        }
        None => {
            debug!(
                old_lines = a_mid.len(),
                new_lines = b_mid.len(),
                "patch.diff_fallback"
            );
            ops.push(hunk(
                &a,
                &b,
                prefix..a.lines.len() - suffix,
                prefix..b.lines.len() - suffix,
            )?);
        }
    }
    Patch { ops }.encode()
}

fn hunk(
    a: &Lines<'_>,
    b: &Lines<'_>,
    a_range: std::ops::Range<usize>,
    b_range: std::ops::Range<usize>,
) -> Result<PatchOp> {
    op_at(
        a.offsets[a_range.start],
        a.offsets[a_range.end],
        b.lines[b_range].concat(),
    )
}

fn op_at(start: usize, end: usize, data: Vec<u8>) -> Result<PatchOp> {
    Ok(PatchOp {
        start: be::to_u32(start, "hunk start")?,
        end: be::to_u32(end, "hunk end")?,
        data,
    })
}

/// Myers' O(ND) shortest edit script, or `None` past [`MAX_EDIT_COST`].
fn shortest_edit(a: &[&[u8]], b: &[&[u8]]) -> Option<Vec<Edit>> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max = (a.len() + b.len()).min(MAX_EDIT_COST) as isize;
    let offset = max + 1;
    let mut v = vec![0isize; (2 * max + 3) as usize];
    // trace[d] holds v[-d-1..=d+1] as it stood before step d.
    let mut trace: Vec<Vec<isize>> = Vec::new();
    let mut found = None;

    'outer: for d in 0..=max {
        let lo = (offset - d - 1) as usize;
        let hi = (offset + d + 1) as usize;
        trace.push(v[lo..=hi].to_vec());
        let mut k = -d;
        while k <= d {
            let idx = (offset + k) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                found = Some(d);
                break 'outer;
            }
            k += 2;
        }
    }
    found?;

    let mut edits = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, window) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let at = |k: isize| window[(k + d + 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;
        while x > prev_x && y > prev_y {
            edits.push(Edit::Keep);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            edits.push(if x == prev_x { Edit::Insert } else { Edit::Delete });
        }
        x = prev_x;
        y = prev_y;
    }
    edits.reverse();
    Some(edits)
}
