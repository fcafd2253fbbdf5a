use std::fmt::Write as _;

use super::opcode::{Direction, Needle, Opcode, PresserMode};
use super::store::{CARRIERS_HEADER, InstructionStore, MAX_CARRIERS};
use crate::foundation::error::{KnitError, KnitResult};

const VERSION_PREFIX: &str = ";!knitout-";
const META_TAG: &str = "$meta=";

/// Serialization options for [`write_text`] and [`parse_text`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TextOptions {
    /// Keep comment-less, metadata-less `noop` rows as empty lines.
    pub keep_empty: bool,
}

/// Serialize a store to knitout text.
pub fn write_text(store: &InstructionStore, opts: TextOptions) -> String {
    let mut out = String::with_capacity(store.len() * 16 + 64);
    let _ = writeln!(out, "{VERSION_PREFIX}{}", store.version());
    for (name, value) in store.headers() {
        let _ = writeln!(out, ";;{name}: {value}");
    }
    for row in 0..store.len() {
        let op = store.opcode(row);
        let trailer = comment_trailer(store.comment(row), store.meta(row));
        if op == Opcode::Noop {
            match trailer {
                Some(t) => {
                    out.push(';');
                    out.push_str(&t);
                    out.push('\n');
                }
                None if opts.keep_empty => out.push('\n'),
                None => {}
            }
            continue;
        }
        write_code(&mut out, store, row, op);
        if let Some(t) = trailer {
            out.push_str(" ;");
            out.push_str(&t);
        }
        out.push('\n');
    }
    out
}

fn comment_trailer(comment: Option<&str>, meta: Option<u32>) -> Option<String> {
    match (comment, meta) {
        (None, None) => None,
        // A comment that itself ends like metadata gets an explicit empty tag.
        (Some(c), None) if split_meta(c).1.is_some() => Some(format!("{c} {META_TAG}0")),
        (Some(c), None) => Some(c.to_string()),
        (None, Some(m)) => Some(format!("{META_TAG}{m}")),
        (Some(c), Some(m)) => Some(format!("{c} {META_TAG}{m}")),
    }
}

fn write_code(out: &mut String, store: &InstructionStore, row: usize, op: Opcode) {
    out.push_str(op.name());
    let carriers = |slot: usize| store.carrier_names(store.raw_arg(row, slot));
    match op {
        Opcode::Noop | Opcode::Pause => {}
        Opcode::In | Opcode::Inhook | Opcode::Releasehook | Opcode::Out | Opcode::Outhook => {
            for c in carriers(0) {
                let _ = write!(out, " {c}");
            }
        }
        Opcode::Stitch => {
            let _ = write!(
                out,
                " {} {}",
                store.float_arg(row, 0),
                store.float_arg(row, 1)
            );
        }
        Opcode::Rack | Opcode::XSpeedNumber => {
            let _ = write!(out, " {}", store.float_arg(row, 0));
        }
        Opcode::Knit | Opcode::Tuck | Opcode::Miss => {
            let _ = write!(
                out,
                " {} {}",
                store.direction(row).symbol(),
                store.needle_arg(row, 0)
            );
            for c in carriers(1) {
                let _ = write!(out, " {c}");
            }
        }
        Opcode::Split => {
            let _ = write!(
                out,
                " {} {} {}",
                store.direction(row).symbol(),
                store.needle_arg(row, 0),
                store.needle_arg(row, 1)
            );
            for c in carriers(2) {
                let _ = write!(out, " {c}");
            }
        }
        Opcode::Drop | Opcode::Amiss => {
            let _ = write!(out, " {}", store.needle_arg(row, 0));
        }
        Opcode::Xfer => {
            let _ = write!(
                out,
                " {} {}",
                store.needle_arg(row, 0),
                store.needle_arg(row, 1)
            );
        }
        Opcode::XStitchNumber => {
            let _ = write!(out, " {}", store.raw_arg(row, 0));
        }
        Opcode::XPresserMode => {
            let mode = PresserMode::from_code(store.raw_arg(row, 0));
            let _ = write!(out, " {}", mode.name());
        }
    }
}

/// Parse knitout text back into a packed store.
pub fn parse_text(src: &str, opts: TextOptions) -> KnitResult<InstructionStore> {
    let mut lines = src.lines().enumerate().peekable();
    let Some((_, first)) = lines.next() else {
        return Err(KnitError::knitout(1, "empty input"));
    };
    let version = first
        .strip_prefix(VERSION_PREFIX)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| KnitError::knitout(1, "expected ';!knitout-<N>' header"))?;

    let mut store = InstructionStore::default();
    store.set_version(version);
    while let Some(&(i, line)) = lines.peek() {
        let Some((name, value)) = parse_header(line) else {
            break;
        };
        if name == CARRIERS_HEADER && value.split_whitespace().count() > MAX_CARRIERS {
            return Err(KnitError::knitout(
                i + 1,
                format!("at most {MAX_CARRIERS} carriers are supported"),
            ));
        }
        store.set_header(name, value);
        lines.next();
    }
    if store.header(CARRIERS_HEADER).is_none() {
        return Err(KnitError::knitout(2, "missing mandatory 'Carriers' header"));
    }

    for (i, line) in lines {
        let line_no = i + 1;
        parse_body_line(&mut store, line, line_no, opts)?;
    }
    Ok(store)
}

fn parse_header(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(";;")?;
    let (name, value) = rest.split_once(": ").or_else(|| {
        // `;;Name:` with an empty value.
        rest.strip_suffix(':').map(|n| (n, ""))
    })?;
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name, value))
}

fn split_meta(comment: &str) -> (Option<&str>, Option<u32>) {
    if let Some(idx) = comment.rfind(META_TAG) {
        let digits = &comment[idx + META_TAG.len()..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(m) = digits.parse::<u32>() {
                let head = &comment[..idx];
                let head = head.strip_suffix(' ').unwrap_or(head);
                let head = (!head.is_empty()).then_some(head);
                return (head, Some(m));
            }
        }
    }
    ((!comment.is_empty()).then_some(comment), None)
}

fn parse_body_line(
    store: &mut InstructionStore,
    line: &str,
    line_no: usize,
    opts: TextOptions,
) -> KnitResult<()> {
    let (code, comment) = match line.find(';') {
        Some(i) => (&line[..i], Some(&line[i + 1..])),
        None => (line, None),
    };
    let (comment, meta) = match comment {
        Some(c) => split_meta(c),
        None => (None, None),
    };
    let code = code.trim();
    if code.is_empty() {
        if comment.is_none() && meta.is_none() {
            if opts.keep_empty {
                store.noop();
            }
            return Ok(());
        }
        let row = store.noop();
        if let Some(c) = comment {
            store.set_comment(row, c);
        }
        store.set_meta(row, meta.unwrap_or(0));
        return Ok(());
    }

    let mut toks = code.split_whitespace();
    let name = toks.next().unwrap_or_default();
    let op = Opcode::from_name(name)
        .ok_or_else(|| KnitError::knitout(line_no, format!("unknown opcode '{name}'")))?;
    let rest: Vec<&str> = toks.collect();
    let err = |msg: &str| KnitError::knitout(line_no, format!("{name}: {msg}"));

    let needle = |tok: Option<&&str>| -> KnitResult<Needle> {
        tok.and_then(|t| Needle::parse(t))
            .ok_or_else(|| err("expected needle"))
    };
    let float = |tok: Option<&&str>| -> KnitResult<f32> {
        tok.and_then(|t| t.parse::<f32>().ok())
            .ok_or_else(|| err("expected number"))
    };
    let carriers = |toks: &[&str]| -> KnitResult<u32> {
        store
            .carrier_mask(toks)
            .map_err(|e| KnitError::knitout(line_no, e.to_string()))
    };
    let direction = |tok: Option<&&str>| -> KnitResult<Direction> {
        match tok.copied() {
            Some("+") => Ok(Direction::Right),
            Some("-") => Ok(Direction::Left),
            _ => Err(err("expected direction '+' or '-'")),
        }
    };
    let expect_len = |n: usize| -> KnitResult<()> {
        if rest.len() == n {
            Ok(())
        } else {
            Err(err(&format!("expected {n} arguments, found {}", rest.len())))
        }
    };

    let (dir, args): (Direction, [u32; 3]) = match op {
        Opcode::Noop | Opcode::Pause => {
            expect_len(0)?;
            (Direction::None, [0; 3])
        }
        Opcode::In | Opcode::Inhook | Opcode::Releasehook | Opcode::Out | Opcode::Outhook => {
            if rest.is_empty() {
                return Err(err("expected carriers"));
            }
            (Direction::None, [carriers(&rest)?, 0, 0])
        }
        Opcode::Stitch => {
            expect_len(2)?;
            let l = float(rest.first())?;
            let t = float(rest.get(1))?;
            (Direction::None, [l.to_bits(), t.to_bits(), 0])
        }
        Opcode::Rack | Opcode::XSpeedNumber => {
            expect_len(1)?;
            (Direction::None, [float(rest.first())?.to_bits(), 0, 0])
        }
        Opcode::Knit | Opcode::Tuck | Opcode::Miss => {
            if rest.len() < 2 {
                return Err(err("expected direction and needle"));
            }
            let d = direction(rest.first())?;
            let n = needle(rest.get(1))?;
            (d, [n.pack(), carriers(&rest[2..])?, 0])
        }
        Opcode::Split => {
            if rest.len() < 3 {
                return Err(err("expected direction and two needles"));
            }
            let d = direction(rest.first())?;
            let a = needle(rest.get(1))?;
            let b = needle(rest.get(2))?;
            (d, [a.pack(), b.pack(), carriers(&rest[3..])?])
        }
        Opcode::Drop | Opcode::Amiss => {
            expect_len(1)?;
            (Direction::None, [needle(rest.first())?.pack(), 0, 0])
        }
        Opcode::Xfer => {
            expect_len(2)?;
            let a = needle(rest.first())?;
            let b = needle(rest.get(1))?;
            (Direction::None, [a.pack(), b.pack(), 0])
        }
        Opcode::XStitchNumber => {
            expect_len(1)?;
            let n = rest[0]
                .parse::<u32>()
                .map_err(|_| err("expected integer"))?;
            (Direction::None, [n, 0, 0])
        }
        Opcode::XPresserMode => {
            expect_len(1)?;
            let m = PresserMode::from_name(rest[0]).ok_or_else(|| err("expected on|off|auto"))?;
            (Direction::None, [m as u32, 0, 0])
        }
    };

    let row = store.push_raw(op, dir, args);
    if let Some(c) = comment {
        store.set_comment(row, c);
    }
    store.set_meta(row, meta.unwrap_or(0));
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/knitout/text.rs"]
mod tests;
