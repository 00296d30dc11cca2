//! Replays editor commands received from the server

use std::collections::{BTreeMap, HashMap};

use super::client::Item;

/// Outcome of an editor drive as a working copy would see it
#[derive(Debug, Default)]
pub struct AppliedEdit {
    pub target_rev: u64,
    /// Structural operations in order, e.g. `add-dir docs`
    pub ops: Vec<String>,
    /// New content of every file that received text
    pub contents: BTreeMap<String, Vec<u8>>,
    /// Properties set on files; `None` deletes the property
    pub file_props: BTreeMap<String, BTreeMap<String, Option<String>>>,
    pub dir_props: BTreeMap<String, BTreeMap<String, Option<String>>>,
    /// `close-file` checksums by path
    pub checksums: BTreeMap<String, Option<String>>,
    /// Base checksums announced by `apply-textdelta`
    pub base_checksums: BTreeMap<String, Option<String>>,
}

impl AppliedEdit {
    /// Replay `commands`; `bases` holds the working copy content of opened files
    pub fn replay(commands: &[(String, Vec<Item>)], bases: &BTreeMap<String, Vec<u8>>) -> Self {
        let mut edit = Self::default();
        let mut paths: HashMap<String, String> = HashMap::new();
        let mut deltas: HashMap<String, Vec<u8>> = HashMap::new();

        for (name, args) in commands {
            match name.as_str() {
                "target-rev" => edit.target_rev = args[0].number(),
                "open-root" => {
                    paths.insert(args[1].text(), String::new());
                }
                "delete-entry" => edit.ops.push(format!("delete-entry {}", args[0].text())),
                "add-dir" | "open-dir" | "add-file" | "open-file" => {
                    let path = args[0].text();
                    edit.ops.push(format!("{} {}", name, path));
                    paths.insert(args[2].text(), path);
                }
                "change-file-prop" | "change-dir-prop" => {
                    let path = paths[&args[0].text()].clone();
                    let value = optional_text(&args[2]);
                    let props = if name == "change-file-prop" {
                        &mut edit.file_props
                    } else {
                        &mut edit.dir_props
                    };
                    props.entry(path).or_default().insert(args[1].text(), value);
                }
                "apply-textdelta" => {
                    let token = args[0].text();
                    edit.base_checksums
                        .insert(paths[&token].clone(), optional_text(&args[1]));
                    deltas.insert(token, Vec::new());
                }
                "textdelta-chunk" => {
                    deltas
                        .get_mut(&args[0].text())
                        .expect("chunk before apply-textdelta")
                        .extend_from_slice(args[1].bytes());
                }
                "textdelta-end" => {
                    let token = args[0].text();
                    let delta = deltas.remove(&token).expect("end before apply-textdelta");
                    if !delta.is_empty() {
                        let path = paths[&token].clone();
                        let base = bases.get(&path).cloned().unwrap_or_default();
                        edit.contents.insert(path, apply_svndiff(&base, &delta));
                    }
                }
                "close-file" => {
                    let path = paths[&args[0].text()].clone();
                    edit.checksums.insert(path, optional_text(&args[1]));
                }
                "close-dir" | "close-edit" => {}
                other => panic!("unexpected editor command {}", other),
            }
        }
        edit
    }
}

fn optional_text(item: &Item) -> Option<String> {
    item.list().first().map(Item::text)
}

fn read_varint(data: &[u8], pos: &mut usize) -> usize {
    let mut value = 0usize;
    loop {
        let byte = data[*pos];
        *pos += 1;
        value = (value << 7) | usize::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return value;
        }
    }
}

/// Apply an svndiff0 delta to `source`
pub fn apply_svndiff(source: &[u8], delta: &[u8]) -> Vec<u8> {
    assert_eq!(&delta[..4], b"SVN\0", "not an svndiff0 stream");
    let mut pos = 4;
    let mut target = Vec::new();
    while pos < delta.len() {
        let source_offset = read_varint(delta, &mut pos);
        let source_len = read_varint(delta, &mut pos);
        let target_len = read_varint(delta, &mut pos);
        let instructions_len = read_varint(delta, &mut pos);
        let data_len = read_varint(delta, &mut pos);
        let instructions = &delta[pos..pos + instructions_len];
        let data = &delta[pos + instructions_len..pos + instructions_len + data_len];
        pos += instructions_len + data_len;

        let view = &source[source_offset..source_offset + source_len];
        let mut window: Vec<u8> = Vec::with_capacity(target_len);
        let mut ip = 0;
        let mut dp = 0;
        while ip < instructions.len() {
            let op = instructions[ip] & 0xc0;
            let mut length = usize::from(instructions[ip] & 0x3f);
            ip += 1;
            if length == 0 {
                length = read_varint(instructions, &mut ip);
            }
            match op {
                0x00 => {
                    let offset = read_varint(instructions, &mut ip);
                    window.extend_from_slice(&view[offset..offset + length]);
                }
                0x40 => {
                    let offset = read_varint(instructions, &mut ip);
                    for i in 0..length {
                        let byte = window[offset + i];
                        window.push(byte);
                    }
                }
                0x80 => {
                    window.extend_from_slice(&data[dp..dp + length]);
                    dp += length;
                }
                _ => panic!("invalid svndiff instruction {:x}", op),
            }
        }
        assert_eq!(window.len(), target_len, "window length mismatch");
        target.extend(window);
    }
    target
}
