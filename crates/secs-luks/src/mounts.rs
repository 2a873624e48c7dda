//! Mount-table lookup for mapped devices.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const MOUNTS_OVERRIDE_ENV: &str = "SECS_MOUNTS_PATH";

/// Where `devnode` is currently mounted, if anywhere. Any failure to read
/// or parse the mount table degrades to "not mounted".
pub(crate) fn find_mount_point(devnode: &Path) -> Option<PathBuf> {
    let mounts = read_mount_table().ok()?;
    parse_mounts(&mounts, devnode.to_string_lossy().as_ref())
}

fn read_mount_table() -> std::io::Result<String> {
    if let Ok(path) = env::var(MOUNTS_OVERRIDE_ENV) {
        return fs::read_to_string(path);
    }
    fs::read_to_string("/proc/mounts")
}

fn parse_mounts(mounts: &str, devnode: &str) -> Option<PathBuf> {
    for line in mounts.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let device = parts.next()?;
        let mountpoint = parts.next()?;
        if device == devnode {
            return Some(PathBuf::from(unescape_mount_field(mountpoint)));
        }
    }
    None
}

/// Reverse the octal escaping the kernel applies to whitespace in mount
/// fields (e.g. `\040` for a space).
fn unescape_mount_field(input: &str) -> String {
    let mut chars = input.chars().peekable();
    let mut output = String::with_capacity(input.len());

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let mut oct = String::new();
            for _ in 0..3 {
                if let Some(next) = chars.peek() {
                    if !next.is_ascii_digit() {
                        break;
                    }
                }
                if let Some(next) = chars.next() {
                    oct.push(next);
                }
            }
            if oct.len() == 3 {
                if let Ok(value) = u8::from_str_radix(&oct, 8) {
                    output.push(value as char);
                    continue;
                }
            }
            output.push('\\');
            output.push_str(&oct);
        } else {
            output.push(ch);
        }
    }

    output
}
