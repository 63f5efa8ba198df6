//! String literal quoting
//!
//! Printable ASCII is emitted as is. `\n \r \t \" \' \\` and `\a \b \f \v`
//! use short escapes, other control bytes and invalid UTF-8 become three
//! digit octal escapes. Non-printable code points use `\uXXXX` or
//! `\UXXXXXXXX`.

use std::fmt::Write;

pub fn quote_str(s: &str) -> String {
    quote_bytes(s.as_bytes())
}

pub fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            push_char(&mut out, c);
        }
        for b in chunk.invalid() {
            octal(&mut out, *b);
        }
    }
    out.push('"');
    out
}

fn push_char(out: &mut String, c: char) {
    match c {
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '"' => out.push_str("\\\""),
        '\'' => out.push_str("\\'"),
        '\\' => out.push_str("\\\\"),
        '\x07' => out.push_str("\\a"),
        '\x08' => out.push_str("\\b"),
        '\x0c' => out.push_str("\\f"),
        '\x0b' => out.push_str("\\v"),
        ' '..='~' => out.push(c),
        c if c.is_ascii() => octal(out, c as u8),
        c if is_printable(c) => out.push(c),
        c if (c as u32) < 0x10000 => {
            let _ = write!(out, "\\u{:04X}", c as u32);
        }
        c => {
            let _ = write!(out, "\\U{:08X}", c as u32);
        }
    }
}

fn octal(out: &mut String, b: u8) {
    let _ = write!(out, "\\{:03o}", b);
}

/// Non-ASCII code points that render visibly
fn is_printable(c: char) -> bool {
    let n = c as u32;
    !(c.is_control()
        || c.is_whitespace()
        // format characters
        || n == 0xAD
        || (0x200B..=0x200F).contains(&n)
        || (0x202A..=0x202E).contains(&n)
        || (0x2060..=0x206F).contains(&n)
        || n == 0xFEFF
        // private use
        || (0xE000..=0xF8FF).contains(&n)
        || n >= 0xF0000
        // noncharacters
        || (0xFDD0..=0xFDEF).contains(&n)
        || n & 0xFFFE == 0xFFFE)
}
