//! Byte delta encoding for file contents
//!
//! The server treats delta computation as an opaque capability. The bundled
//! [`SvnDiff0`] encoder writes svndiff version 0: it copies the common prefix
//! and suffix from the source and ships the middle as new data, which is
//! enough for every client and keeps the encoder trivial.

/// Compute a delta that turns `source` into `target`
pub trait DeltaEncoder: Send + Sync {
    fn delta(&self, source: &[u8], target: &[u8]) -> Vec<u8>;
}

/// Target bytes per window, as used by svn itself
pub const WINDOW_SIZE: usize = 100 * 1024;

const HEADER: &[u8] = b"SVN\0";

const OP_COPY_SOURCE: u8 = 0x00;
const OP_NEW_DATA: u8 = 0x80;

/// svndiff0 encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct SvnDiff0;

impl DeltaEncoder for SvnDiff0 {
    fn delta(&self, source: &[u8], target: &[u8]) -> Vec<u8> {
        let mut out = HEADER.to_vec();
        if target.is_empty() {
            return out;
        }

        if !source.is_empty() && source.len() <= WINDOW_SIZE && target.len() <= WINDOW_SIZE {
            write_prefix_suffix_window(&mut out, source, target);
            return out;
        }

        for chunk in target.chunks(WINDOW_SIZE) {
            let mut instructions = Vec::new();
            push_instruction(&mut instructions, OP_NEW_DATA, chunk.len(), None);
            write_window(&mut out, 0, 0, chunk.len(), &instructions, chunk);
        }
        out
    }
}

fn write_prefix_suffix_window(out: &mut Vec<u8>, source: &[u8], target: &[u8]) {
    let max_common = source.len().min(target.len());
    let prefix = source
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = source
        .iter()
        .rev()
        .zip(target.iter().rev())
        .take(max_common - prefix)
        .take_while(|(a, b)| a == b)
        .count();

    let middle = &target[prefix..target.len() - suffix];
    let mut instructions = Vec::new();
    if prefix > 0 {
        push_instruction(&mut instructions, OP_COPY_SOURCE, prefix, Some(0));
    }
    if !middle.is_empty() {
        push_instruction(&mut instructions, OP_NEW_DATA, middle.len(), None);
    }
    if suffix > 0 {
        push_instruction(&mut instructions, OP_COPY_SOURCE, suffix, Some(source.len() - suffix));
    }
    write_window(out, 0, source.len(), target.len(), &instructions, middle);
}

fn push_instruction(buf: &mut Vec<u8>, op: u8, length: usize, offset: Option<usize>) {
    if length < 0x40 {
        buf.push(op | length as u8);
    } else {
        buf.push(op);
        write_varint(buf, length);
    }
    if let Some(offset) = offset {
        write_varint(buf, offset);
    }
}

fn write_window(
    out: &mut Vec<u8>,
    source_offset: usize,
    source_len: usize,
    target_len: usize,
    instructions: &[u8],
    new_data: &[u8],
) {
    write_varint(out, source_offset);
    write_varint(out, source_len);
    write_varint(out, target_len);
    write_varint(out, instructions.len());
    write_varint(out, new_data.len());
    out.extend_from_slice(instructions);
    out.extend_from_slice(new_data);
}

/// Big-endian base-128 with continuation bit
fn write_varint(out: &mut Vec<u8>, value: usize) {
    let mut groups = vec![(value & 0x7f) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        groups.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    out.extend(groups.iter().rev());
}
