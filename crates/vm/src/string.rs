//! The string subsystem.
//!
//! Strings are immutable UTF-8 byte sequences in one of three storage modes:
//! an owned buffer, a borrowed constant buffer, or a memory-mapped read-only
//! file. A string may additionally be a *singleton*: registered in the
//! per-VM intern table keyed by byte content, after which reference identity
//! implies content equality. Property keys are always singletons.

use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use hashbrown::HashMap;
use memmap2::Mmap;
use xxhash_rust::xxh3::Xxh3Builder;

use crate::context::Context;
use crate::error::VmResult;
use crate::heap::{GcRef, HeapObject, Kind};
use crate::value::{self, Value};

/// Backing storage of a string.
#[derive(Clone)]
pub enum StrData {
    /// Heap-owned bytes.
    Owned(Arc<[u8]>),
    /// Borrowed constant bytes.
    Static(&'static [u8]),
    /// Memory-mapped read-only bytes.
    Mapped(Arc<Mmap>),
}

impl StrData {
    /// The raw UTF-8 bytes.
    pub fn bytes(&self) -> &[u8] {
        match self {
            StrData::Owned(b) => b,
            StrData::Static(b) => b,
            StrData::Mapped(m) => m,
        }
    }
}

/// A heap string.
pub struct StrObject {
    pub(crate) data: StrData,
    pub(crate) singleton: bool,
}

// Intern-table key: a cheap clone of the string storage, hashed and compared
// by content so lookups by byte slice need no allocation.
pub(crate) struct InternKey(StrData);

impl Hash for InternKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        <[u8] as Hash>::hash(self.0.bytes(), state);
    }
}

impl PartialEq for InternKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.bytes() == other.0.bytes()
    }
}

impl Eq for InternKey {}

impl Borrow<[u8]> for InternKey {
    fn borrow(&self) -> &[u8] {
        self.0.bytes()
    }
}

/// The per-VM singleton-string table.
pub(crate) struct InternTable {
    map: HashMap<InternKey, GcRef, Xxh3Builder>,
}

impl InternTable {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::with_hasher(Xxh3Builder::new()),
        }
    }

    pub(crate) fn lookup(&self, bytes: &[u8]) -> Option<GcRef> {
        self.map.get(bytes).copied()
    }

    pub(crate) fn insert(&mut self, data: StrData, r: GcRef) {
        self.map.insert(InternKey(data), r);
    }

    /// Called when a singleton string is swept.
    pub(crate) fn remove(&mut self, bytes: &[u8]) {
        self.map.remove(bytes);
    }

    pub(crate) fn refs(&self) -> impl Iterator<Item = GcRef> + '_ {
        self.map.values().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}

/// Trim sides for [`Context::string_trim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMode {
    /// Leading whitespace only.
    Left,
    /// Trailing whitespace only.
    Right,
    /// Both ends.
    Both,
}

impl<'vm> Context<'vm> {
    // Allocate a string object.
    fn alloc_string(&mut self, data: StrData) -> Value {
        let r = self.heap_add(HeapObject::Str(StrObject {
            data,
            singleton: false,
        }));
        Value::Heap(r)
    }

    /// Creates an owned string from text.
    pub fn string_new(&mut self, s: &str) -> VmResult<Value> {
        Ok(self.alloc_string(StrData::Owned(Arc::from(s.as_bytes()))))
    }

    /// Creates a string over a constant buffer without copying.
    pub fn string_from_static(&mut self, s: &'static str) -> VmResult<Value> {
        Ok(self.alloc_string(StrData::Static(s.as_bytes())))
    }

    /// Creates a string by memory-mapping a file. The content must be valid
    /// UTF-8.
    pub fn string_from_file(&mut self, path: &Path) -> VmResult<Value> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                return Err(self.throw_system_error(format!(
                    "cannot open \"{}\": {e}",
                    path.display()
                )))
            }
        };

        // Safety: the mapping is read-only and the VM never mutates mapped
        // string bytes.
        let map = match unsafe { Mmap::map(&file) } {
            Ok(m) => m,
            Err(e) => {
                return Err(self.throw_system_error(format!(
                    "cannot map \"{}\": {e}",
                    path.display()
                )))
            }
        };

        if std::str::from_utf8(&map).is_err() {
            return Err(self.throw_syntax_error(format!(
                "\"{}\" is not valid UTF-8",
                path.display()
            )));
        }

        Ok(self.alloc_string(StrData::Mapped(Arc::new(map))))
    }

    /// True when the value is a string.
    pub fn is_string(&self, v: Value) -> bool {
        matches!(
            v.heap_ref().map(|r| self.core.heap.kind(r)),
            Some(Kind::Str) | Some(Kind::SingletonStr)
        )
    }

    /// The string's bytes, when the value is a string.
    pub fn str_bytes(&self, v: Value) -> Option<&[u8]> {
        let r = v.heap_ref()?;
        Some(self.core.heap.try_get(r)?.str_object()?.data.bytes())
    }

    /// The string's text, when the value is a string of valid UTF-8.
    pub fn str_text(&self, v: Value) -> Option<&str> {
        std::str::from_utf8(self.str_bytes(v)?).ok()
    }

    /// Byte length of a string.
    pub fn string_length(&self, v: Value) -> Option<usize> {
        self.str_bytes(v).map(|b| b.len())
    }

    /// Unicode characters of a string, decoded from UTF-8.
    pub fn string_chars(&self, v: Value) -> Option<std::str::Chars<'_>> {
        self.str_text(v).map(|t| t.chars())
    }

    /// Content equality. Identical references are equal without comparing
    /// bytes.
    pub fn string_equal(&self, a: Value, b: Value) -> bool {
        if a.identical(b) {
            return true;
        }
        match (self.str_bytes(a), self.str_bytes(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Byte-wise ordering of two strings.
    pub fn string_compare(&self, a: Value, b: Value) -> Option<std::cmp::Ordering> {
        Some(self.str_bytes(a)?.cmp(self.str_bytes(b)?))
    }

    /// Concatenates two strings into a new one.
    pub fn string_concat(&mut self, a: Value, b: Value) -> VmResult<Value> {
        let (x, y) = match (self.str_bytes(a), self.str_bytes(b)) {
            (Some(x), Some(y)) => (x.to_vec(), y.to_vec()),
            _ => return Err(self.throw_type_error("the value is not a string")),
        };

        let mut bytes = x;
        bytes.extend_from_slice(&y);
        Ok(self.alloc_string(StrData::Owned(Arc::from(bytes.as_slice()))))
    }

    /// Byte substring. Negative indices count from the end; `end` past the
    /// length clamps; `end < start` yields the empty string.
    pub fn string_substr(
        &mut self,
        s: Value,
        start: isize,
        end: Option<isize>,
    ) -> VmResult<Value> {
        let bytes = match self.str_bytes(s) {
            Some(b) => b.to_vec(),
            None => return Err(self.throw_type_error("the value is not a string")),
        };
        let len = bytes.len() as isize;

        let clamp = |i: isize| -> usize {
            let i = if i < 0 { len + i } else { i };
            i.clamp(0, len) as usize
        };

        let a = clamp(start);
        let b = clamp(end.unwrap_or(len));
        if b <= a {
            return self.string_new("");
        }

        Ok(self.alloc_string(StrData::Owned(Arc::from(&bytes[a..b]))))
    }

    /// Removes ASCII whitespace from the requested ends.
    pub fn string_trim(&mut self, s: Value, mode: TrimMode) -> VmResult<Value> {
        let text = match self.str_text(s) {
            Some(t) => t,
            None => return Err(self.throw_type_error("the value is not a string")),
        };

        let trimmed = match mode {
            TrimMode::Left => text.trim_start_matches(|c: char| c.is_ascii_whitespace()),
            TrimMode::Right => text.trim_end_matches(|c: char| c.is_ascii_whitespace()),
            TrimMode::Both => text.trim_matches(|c: char| c.is_ascii_whitespace()),
        };
        let owned = trimmed.to_string();
        self.string_new(&owned)
    }

    /// Finds the first occurrence of `pat` at or after byte `from`; null
    /// when absent.
    pub fn string_find(&mut self, s: Value, pat: Value, from: usize) -> VmResult<Value> {
        let (hay, needle) = match (self.str_bytes(s), self.str_bytes(pat)) {
            (Some(h), Some(n)) => (h.to_vec(), n.to_vec()),
            _ => return Err(self.throw_type_error("the value is not a string")),
        };

        if from > hay.len() {
            return Ok(Value::Null);
        }
        if needle.is_empty() {
            return Ok(Value::Number(from as f64));
        }

        let found = hay[from..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|i| i + from);
        Ok(match found {
            Some(i) => Value::Number(i as f64),
            None => Value::Null,
        })
    }

    /// Forces a string into owned storage; the single-conversion resolution
    /// of the ownership flag.
    pub fn string_make_owned(&mut self, s: Value) -> VmResult<()> {
        let r = match s.heap_ref() {
            Some(r) if self.is_string(s) => r,
            _ => return Err(self.throw_type_error("the value is not a string")),
        };

        let obj = self.core.heap.get_mut(r);
        if let HeapObject::Str(so) = obj {
            if let StrData::Owned(_) = so.data {
                return Ok(());
            }
            so.data = StrData::Owned(Arc::from(so.data.bytes()));
        }
        Ok(())
    }

    /// Replaces occurrences of `pat` in `s`.
    ///
    /// `rep` is either a pattern string, where `$0`..`$99` substitute match
    /// groups (one digit after `$` unless the next character is also a
    /// digit; an out-of-range group substitutes the empty string), `` $` ``
    /// and `$'` the text before/after the match, `$&` the match, `$$` a
    /// literal dollar, `$u`/`$l` prefixes convert case; or a callable
    /// invoked with the matched text. With a plain-string pattern only
    /// group 0 exists.
    pub fn string_replace(
        &mut self,
        s: Value,
        pat: Value,
        rep: Value,
        pos: usize,
        once: bool,
    ) -> VmResult<Value> {
        let hay = match self.str_bytes(s) {
            Some(b) => b.to_vec(),
            None => return Err(self.throw_type_error("the value is not a string")),
        };
        let needle = match self.str_bytes(pat) {
            Some(b) => b.to_vec(),
            None => return Err(self.throw_type_error("the pattern is not a string")),
        };

        let segments = if self.is_string(rep) {
            let text = self.str_bytes(rep).expect("string lost its bytes").to_vec();
            Some(parse_replace_pattern(&text))
        } else {
            None
        };

        let mut out: Vec<u8> = Vec::new();
        let mut pos = pos;
        let mut begin = pos.min(hay.len());
        out.extend_from_slice(&hay[..begin]);

        while pos <= hay.len() {
            let found = if needle.is_empty() {
                Some(pos)
            } else if pos < hay.len() {
                hay[pos..]
                    .windows(needle.len())
                    .position(|w| w == needle)
                    .map(|i| i + pos)
            } else {
                None
            };

            let Some(start) = found else { break };
            let end = start + needle.len();

            if start != begin {
                out.extend_from_slice(&hay[begin..start]);
            }

            match &segments {
                Some(segments) => {
                    render_replace_pattern(segments, &hay, start, end, &mut out);
                }
                None => {
                    let matched = self.string_new(&String::from_utf8_lossy(&hay[start..end]))?;
                    let rv = self.call(rep, Value::Null, &[matched])?;
                    let rv = self.to_string(rv)?;
                    if let Some(b) = self.str_bytes(rv) {
                        out.extend_from_slice(b);
                    }
                }
            }

            pos = if end == pos { pos + 1 } else { end };
            begin = pos;

            if once {
                break;
            }
        }

        if begin < hay.len() {
            out.extend_from_slice(&hay[begin..]);
        }

        Ok(self.alloc_string(StrData::Owned(Arc::from(out.as_slice()))))
    }

    // ---- interning -------------------------------------------------------

    /// Interns a string value and returns the canonical singleton reference.
    /// Idempotent: interning the same content always yields the same
    /// reference.
    pub fn to_sym(&mut self, v: Value) -> VmResult<GcRef> {
        let r = match v.heap_ref() {
            Some(r) if self.is_string(v) => r,
            _ => return Err(self.throw_type_error("the value is not a string")),
        };

        if self.core.heap.kind(r) == Kind::SingletonStr {
            return Ok(r);
        }

        let data = match self.core.heap.get(r) {
            HeapObject::Str(s) => s.data.clone(),
            _ => unreachable!("string kind lost its data"),
        };

        if let Some(existing) = self.core.interns.lookup(data.bytes()) {
            return Ok(existing);
        }

        if let HeapObject::Str(s) = self.core.heap.get_mut(r) {
            s.singleton = true;
        }
        self.core.interns.insert(data, r);
        Ok(r)
    }

    /// Interns a literal and returns its singleton reference.
    pub fn sym(&mut self, name: &str) -> VmResult<GcRef> {
        if let Some(existing) = self.core.interns.lookup(name.as_bytes()) {
            return Ok(existing);
        }

        let data = StrData::Owned(Arc::from(name.as_bytes()));
        let r = self.heap_add(HeapObject::Str(StrObject {
            data: data.clone(),
            singleton: true,
        }));
        self.core.interns.insert(data, r);
        Ok(r)
    }

    /// Interns a literal and returns it as a value.
    pub fn sym_value(&mut self, name: &str) -> VmResult<Value> {
        Ok(Value::Heap(self.sym(name)?))
    }

    // Owned copy of an interned key's text, for messages.
    pub(crate) fn sym_text(&self, sym: GcRef) -> String {
        self.core
            .heap
            .try_get(sym)
            .and_then(|o| o.str_object())
            .map(|s| String::from_utf8_lossy(s.data.bytes()).into_owned())
            .unwrap_or_default()
    }

    // ---- protocol --------------------------------------------------------

    // Numeric keys read 1-byte substrings; anything else is not an own
    // property.
    pub(crate) fn string_index_get(&mut self, o: Value, key: Value) -> VmResult<Option<Value>> {
        if let Value::Number(n) = key {
            if let Some(idx) = value::as_index(n) {
                let byte = self.str_bytes(o).and_then(|b| b.get(idx).copied());
                return match byte {
                    Some(b) => {
                        let s = self.alloc_string(StrData::Owned(Arc::from([b].as_slice())));
                        Ok(Some(s))
                    }
                    None => Ok(Some(Value::Null)),
                };
            }
        }
        Ok(None)
    }

    // String `get`: numeric indexing, then the String interface with
    // `this` = the string so method syntax works.
    pub(crate) fn string_get(&mut self, o: Value, key: Value) -> VmResult<Option<Value>> {
        if let Some(v) = self.string_index_get(o, key)? {
            return Ok(Some(v));
        }
        let inf = self.core.globals.string_inf;
        self.object_get_t(inf, key, o)
    }
}

// One segment of a parsed replace pattern.
enum ReplaceSeg {
    Text(Vec<u8>),
    Char(u8),
    Group(usize, Case),
    Before(Case),
    After(Case),
}

#[derive(Clone, Copy, PartialEq)]
enum Case {
    Orig,
    Upper,
    Lower,
}

fn convert_case(bytes: &[u8], case: Case, out: &mut Vec<u8>) {
    match case {
        Case::Orig => out.extend_from_slice(bytes),
        Case::Upper => out.extend(bytes.iter().map(|b| b.to_ascii_uppercase())),
        Case::Lower => out.extend(bytes.iter().map(|b| b.to_ascii_lowercase())),
    }
}

// Parse a `$`-pattern into segments.
fn parse_replace_pattern(pattern: &[u8]) -> Vec<ReplaceSeg> {
    let mut segments = Vec::new();
    let mut i = 0;
    let mut text_start = 0;

    while i < pattern.len() {
        if pattern[i] != b'$' {
            i += 1;
            continue;
        }

        if i > text_start {
            segments.push(ReplaceSeg::Text(pattern[text_start..i].to_vec()));
        }
        i += 1;

        let mut case = Case::Orig;
        match pattern.get(i) {
            Some(b'u') => {
                case = Case::Upper;
                i += 1;
            }
            Some(b'l') => {
                case = Case::Lower;
                i += 1;
            }
            _ => {}
        }

        match pattern.get(i) {
            Some(b'`') => {
                segments.push(ReplaceSeg::Before(case));
                i += 1;
            }
            Some(b'\'') => {
                segments.push(ReplaceSeg::After(case));
                i += 1;
            }
            Some(b'&') => {
                segments.push(ReplaceSeg::Group(0, case));
                i += 1;
            }
            Some(b'$') => {
                segments.push(ReplaceSeg::Char(b'$'));
                i += 1;
            }
            Some(c) if c.is_ascii_digit() => {
                let mut group = (c - b'0') as usize;
                i += 1;
                if let Some(c2) = pattern.get(i).filter(|c2| c2.is_ascii_digit()) {
                    group = group * 10 + (c2 - b'0') as usize;
                    i += 1;
                }
                segments.push(ReplaceSeg::Group(group, case));
            }
            _ => {
                segments.push(ReplaceSeg::Char(b'$'));
            }
        }

        text_start = i;
    }

    if pattern.len() > text_start {
        segments.push(ReplaceSeg::Text(pattern[text_start..].to_vec()));
    }

    segments
}

// Render one match through the parsed pattern. With a plain-string pattern
// only group 0 exists; other groups render empty.
fn render_replace_pattern(
    segments: &[ReplaceSeg],
    hay: &[u8],
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
) {
    for seg in segments {
        match seg {
            ReplaceSeg::Text(t) => out.extend_from_slice(t),
            ReplaceSeg::Char(c) => out.push(*c),
            ReplaceSeg::Group(0, case) => convert_case(&hay[start..end], *case, out),
            ReplaceSeg::Group(_, _) => {}
            ReplaceSeg::Before(case) => convert_case(&hay[..start], *case, out),
            ReplaceSeg::After(case) => convert_case(&hay[end..], *case, out),
        }
    }
}

// ---- String class ---------------------------------------------------------

fn string_is_fn(ctx: &mut Context, _f: Value, _t: Value, args: &[Value]) -> VmResult<Value> {
    let v = args.first().copied().unwrap_or(Value::Null);
    Ok(Value::Bool(ctx.is_string(v)))
}

fn string_length_get(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    match ctx.string_length(this) {
        Some(len) => Ok(Value::Number(len as f64)),
        None => Err(ctx.throw_type_error("the value is not a string")),
    }
}

fn string_substr_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let start = match args.first().copied().unwrap_or(Value::Null) {
        Value::Null => 0,
        v => ctx.to_ssize(v)?,
    };
    let end = match args.get(1).copied().unwrap_or(Value::Null) {
        Value::Null => None,
        v => Some(ctx.to_ssize(v)?),
    };
    ctx.string_substr(this, start, end)
}

fn string_find_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let pat = args.first().copied().unwrap_or(Value::Null);
    let from = match args.get(1).copied().unwrap_or(Value::Null) {
        Value::Null => 0,
        v => ctx.to_index(v)?,
    };
    ctx.string_find(this, pat, from)
}

fn string_trim_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let mode = match args.first().copied() {
        None | Some(Value::Null) => TrimMode::Both,
        Some(v) => {
            let text = ctx.to_string(v)?;
            match ctx.str_text(text) {
                Some("left") => TrimMode::Left,
                Some("right") => TrimMode::Right,
                _ => TrimMode::Both,
            }
        }
    };
    ctx.string_trim(this, mode)
}

fn string_replace_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let pat = args.first().copied().unwrap_or(Value::Null);
    let rep = args.get(1).copied().unwrap_or(Value::Null);
    let once = args
        .get(2)
        .copied()
        .map(|v| ctx.to_bool(v))
        .unwrap_or(false);
    ctx.string_replace(this, pat, rep, 0, once)
}

fn string_set_own_fn(ctx: &mut Context, _f: Value, this: Value, args: &[Value]) -> VmResult<Value> {
    let own = ctx.to_bool(args.first().copied().unwrap_or(Value::Bool(true)));
    if own {
        ctx.string_make_owned(this)?;
    }
    Ok(Value::Null)
}

fn string_to_str_fn(ctx: &mut Context, _f: Value, this: Value, _a: &[Value]) -> VmResult<Value> {
    if !ctx.is_string(this) {
        return Err(ctx.throw_type_error("the value is not a string"));
    }
    Ok(this)
}

/// Builds the `String` class.
pub(crate) fn class_init(ctx: &mut Context) -> VmResult<()> {
    let global = ctx.global_object();

    let (class, inf) = ctx.named_class_new(Value::Null, "String")?;
    ctx.object_add_const_s(global, "String", class)?;
    ctx.core.globals.string_class = class;
    ctx.core.globals.string_inf = inf;

    ctx.object_add_n_method(class, "is", string_is_fn)?;

    ctx.object_add_n_accessor(inf, "length", Some(string_length_get), None)?;
    ctx.object_add_n_method(inf, "substr", string_substr_fn)?;
    ctx.object_add_n_method(inf, "find", string_find_fn)?;
    ctx.object_add_n_method(inf, "trim", string_trim_fn)?;
    ctx.object_add_n_method(inf, "replace", string_replace_fn)?;
    ctx.object_add_n_method(inf, "set_own", string_set_own_fn)?;
    ctx.object_add_n_method(inf, "$to_str", string_to_str_fn)?;

    Ok(())
}

/// Calling the `String` class coerces the argument.
pub(crate) fn string_class_call(
    ctx: &mut Context,
    _class: Value,
    _this: Value,
    args: &[Value],
) -> VmResult<Value> {
    let arg = args.first().copied().unwrap_or(Value::Null);
    ctx.to_string(arg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg_groups(pattern: &str) -> Vec<Option<usize>> {
        parse_replace_pattern(pattern.as_bytes())
            .iter()
            .map(|s| match s {
                ReplaceSeg::Group(n, _) => Some(*n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_replace_pattern_digits() {
        // One digit unless the next character is also a digit.
        assert_eq!(seg_groups("$1x"), vec![Some(1), None]);
        assert_eq!(seg_groups("$10"), vec![Some(10)]);
        assert_eq!(seg_groups("$123"), vec![Some(12), None]);
    }

    #[test]
    fn test_replace_pattern_escapes() {
        let segs = parse_replace_pattern(b"a$$b");
        assert!(matches!(segs[0], ReplaceSeg::Text(_)));
        assert!(matches!(segs[1], ReplaceSeg::Char(b'$')));
        assert!(matches!(segs[2], ReplaceSeg::Text(_)));
    }

    #[test]
    fn test_render_out_of_range_group_is_empty() {
        let segs = parse_replace_pattern(b"[$1]");
        let mut out = Vec::new();
        render_replace_pattern(&segs, b"abc", 1, 2, &mut out);
        assert_eq!(out, b"[]");
    }

    #[test]
    fn test_render_before_after_match() {
        let segs = parse_replace_pattern(b"$`|$&|$'");
        let mut out = Vec::new();
        render_replace_pattern(&segs, b"abcde", 1, 3, &mut out);
        assert_eq!(out, b"a|bc|de");
    }

    #[test]
    fn test_render_case_conversion() {
        let segs = parse_replace_pattern(b"$u&");
        let mut out = Vec::new();
        render_replace_pattern(&segs, b"abc", 0, 3, &mut out);
        assert_eq!(out, b"ABC");
    }
}
