//! Tagged binary/text encoding for dense vectors, matrices and scalars.
//!
//! # Binary layout
//!
//! ```text
//! token   := bytes ' '
//! vector  := "DV " i32le(len) f64le*len
//! matrix  := "DM " i32le(rows) i32le(cols) f64le*(rows*cols)   (row-major)
//! scalar  := u8(8) f64le
//! ```
//!
//! # Text layout
//!
//! Whitespace-separated tokens. Vectors are ` [ v0 v1 ... ]`, matrices put
//! one row per line between `[` and `]`. Floats use Rust's shortest
//! round-trip formatting, so text encoding is also lossless.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use nalgebra::{DMatrix, DVector};

use crate::error::{NoiseVecError, Result};

const VECTOR_TAG: &[u8] = b"DV ";
const MATRIX_TAG: &[u8] = b"DM ";
const SCALAR_SIZE: u8 = 8;

/// Writes tagged values into an in-memory buffer.
pub(crate) struct Encoder {
    buf: BytesMut,
    binary: bool,
}

impl Encoder {
    pub(crate) fn new(binary: bool) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            binary,
        }
    }

    pub(crate) fn token(&mut self, token: &str) {
        debug_assert!(!token.is_empty() && !token.contains(char::is_whitespace));
        self.buf.put_slice(token.as_bytes());
        self.buf.put_u8(b' ');
    }

    pub(crate) fn vector(&mut self, v: &DVector<f64>) {
        if self.binary {
            self.buf.put_slice(VECTOR_TAG);
            self.buf.put_i32_le(v.len() as i32);
            for &x in v.iter() {
                self.buf.put_f64_le(x);
            }
        } else {
            self.buf.put_slice(b" [ ");
            for &x in v.iter() {
                self.buf.put_slice(format!("{x} ").as_bytes());
            }
            self.buf.put_slice(b"]\n");
        }
    }

    pub(crate) fn matrix(&mut self, m: &DMatrix<f64>) {
        if self.binary {
            self.buf.put_slice(MATRIX_TAG);
            self.buf.put_i32_le(m.nrows() as i32);
            self.buf.put_i32_le(m.ncols() as i32);
            for row in m.row_iter() {
                for &x in row.iter() {
                    self.buf.put_f64_le(x);
                }
            }
        } else if m.nrows() == 0 {
            self.buf.put_slice(b" [ ]\n");
        } else {
            self.buf.put_slice(b" [");
            for row in m.row_iter() {
                self.buf.put_slice(b"\n ");
                for &x in row.iter() {
                    self.buf.put_slice(format!(" {x}").as_bytes());
                }
            }
            self.buf.put_slice(b" ]\n");
        }
    }

    pub(crate) fn scalar(&mut self, x: f64) {
        if self.binary {
            self.buf.put_u8(SCALAR_SIZE);
            self.buf.put_f64_le(x);
        } else {
            self.buf.put_slice(format!("{x} ").as_bytes());
        }
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads tagged values back, in the order they were written.
pub(crate) enum Decoder<'a> {
    Binary(&'a [u8]),
    Text(TextTokens<'a>),
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(data: &'a [u8], binary: bool) -> Result<Self> {
        if binary {
            return Ok(Self::Binary(data));
        }
        let text = std::str::from_utf8(data)
            .map_err(|e| NoiseVecError::Format(format!("text input is not UTF-8: {e}")))?;
        Ok(Self::Text(TextTokens::new(text)))
    }

    /// Reads one token and fails unless it equals `expected`.
    pub(crate) fn expect_token(&mut self, expected: &str) -> Result<()> {
        let got = self.token()?;
        if got != expected {
            return Err(NoiseVecError::Format(format!(
                "expected token {expected}, got {got}"
            )));
        }
        Ok(())
    }

    pub(crate) fn token(&mut self) -> Result<String> {
        match self {
            Self::Binary(buf) => {
                let end = buf
                    .iter()
                    .position(|&b| b == b' ')
                    .ok_or_else(|| NoiseVecError::Format("unterminated token".into()))?;
                if end == 0 {
                    return Err(NoiseVecError::Format("empty token".into()));
                }
                let token = String::from_utf8_lossy(&buf[..end]).into_owned();
                buf.advance(end + 1);
                Ok(token)
            }
            Self::Text(tokens) => tokens.word().map(str::to_string),
        }
    }

    pub(crate) fn vector(&mut self) -> Result<DVector<f64>> {
        match self {
            Self::Binary(buf) => {
                expect_tag(buf, VECTOR_TAG, "vector")?;
                let len = read_len(buf)?;
                let data = read_f64s(buf, len)?;
                Ok(DVector::from_vec(data))
            }
            Self::Text(tokens) => {
                tokens.expect_word("[")?;
                let mut data = Vec::new();
                loop {
                    let word = tokens.word()?;
                    if word == "]" {
                        break;
                    }
                    data.push(parse_f64(word)?);
                }
                Ok(DVector::from_vec(data))
            }
        }
    }

    pub(crate) fn matrix(&mut self) -> Result<DMatrix<f64>> {
        match self {
            Self::Binary(buf) => {
                expect_tag(buf, MATRIX_TAG, "matrix")?;
                let rows = read_len(buf)?;
                let cols = read_len(buf)?;
                let n = rows.checked_mul(cols).ok_or_else(|| {
                    NoiseVecError::Format(format!("matrix shape {rows}x{cols} overflows"))
                })?;
                let data = read_f64s(buf, n)?;
                Ok(DMatrix::from_row_slice(rows, cols, &data))
            }
            Self::Text(tokens) => tokens.matrix(),
        }
    }

    pub(crate) fn scalar(&mut self) -> Result<f64> {
        match self {
            Self::Binary(buf) => {
                ensure_remaining(buf, 1 + 8, "scalar")?;
                let size = buf.get_u8();
                if size != SCALAR_SIZE {
                    return Err(NoiseVecError::Format(format!(
                        "expected scalar of size {SCALAR_SIZE}, got size {size}"
                    )));
                }
                Ok(buf.get_f64_le())
            }
            Self::Text(tokens) => parse_f64(tokens.word()?),
        }
    }
}

fn ensure_remaining(buf: &[u8], need: usize, what: &str) -> Result<()> {
    if buf.remaining() < need {
        return Err(NoiseVecError::Format(format!(
            "truncated {what}: need {need} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn expect_tag(buf: &mut &[u8], tag: &[u8], what: &str) -> Result<()> {
    ensure_remaining(buf, tag.len(), what)?;
    if &buf[..tag.len()] != tag {
        return Err(NoiseVecError::Format(format!(
            "expected {what} tag {:?}, got {:?}",
            String::from_utf8_lossy(tag).trim_end(),
            String::from_utf8_lossy(&buf[..tag.len()])
        )));
    }
    buf.advance(tag.len());
    Ok(())
}

fn read_len(buf: &mut &[u8]) -> Result<usize> {
    ensure_remaining(buf, 4, "length")?;
    let len = buf.get_i32_le();
    usize::try_from(len).map_err(|_| NoiseVecError::Format(format!("negative length {len}")))
}

fn read_f64s(buf: &mut &[u8], n: usize) -> Result<Vec<f64>> {
    let bytes = n
        .checked_mul(8)
        .ok_or_else(|| NoiseVecError::Format(format!("element count {n} overflows")))?;
    ensure_remaining(buf, bytes, "values")?;
    Ok((0..n).map(|_| buf.get_f64_le()).collect())
}

fn parse_f64(word: &str) -> Result<f64> {
    word.parse::<f64>()
        .map_err(|_| NoiseVecError::Format(format!("expected a number, got {word:?}")))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TextTok<'a> {
    Word(&'a str),
    Newline,
}

/// Whitespace tokenizer that remembers line breaks, which delimit matrix rows.
pub(crate) struct TextTokens<'a> {
    toks: Vec<TextTok<'a>>,
    pos: usize,
}

impl<'a> TextTokens<'a> {
    fn new(text: &'a str) -> Self {
        let mut toks = Vec::new();
        for line in text.lines() {
            toks.extend(line.split_whitespace().map(TextTok::Word));
            toks.push(TextTok::Newline);
        }
        Self { toks, pos: 0 }
    }

    fn next_tok(&mut self) -> Option<TextTok<'a>> {
        let tok = self.toks.get(self.pos).copied();
        self.pos += 1;
        tok
    }

    /// Next word, skipping line breaks.
    fn word(&mut self) -> Result<&'a str> {
        loop {
            match self.next_tok() {
                Some(TextTok::Word(w)) => return Ok(w),
                Some(TextTok::Newline) => continue,
                None => return Err(NoiseVecError::Format("unexpected end of input".into())),
            }
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<()> {
        let got = self.word()?;
        if got != expected {
            return Err(NoiseVecError::Format(format!(
                "expected {expected:?}, got {got:?}"
            )));
        }
        Ok(())
    }

    fn matrix(&mut self) -> Result<DMatrix<f64>> {
        self.expect_word("[")?;
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut row = Vec::new();
        loop {
            match self.next_tok() {
                Some(TextTok::Word("]")) => {
                    if !row.is_empty() {
                        rows.push(std::mem::take(&mut row));
                    }
                    break;
                }
                Some(TextTok::Word(w)) => row.push(parse_f64(w)?),
                Some(TextTok::Newline) => {
                    if !row.is_empty() {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                None => return Err(NoiseVecError::Format("unterminated matrix".into())),
            }
        }

        let ncols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
            return Err(NoiseVecError::Format(format!(
                "ragged matrix: expected {ncols} columns, got a row of {}",
                bad.len()
            )));
        }
        let data: Vec<f64> = rows.iter().flatten().copied().collect();
        Ok(DMatrix::from_row_slice(rows.len(), ncols, &data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 3, &[1.0, -2.5, 0.1, 3.0e-7, 4.0, f64::MAX])
    }

    fn encode_all(binary: bool) -> Bytes {
        let mut enc = Encoder::new(binary);
        enc.token("<T>");
        enc.vector(&DVector::from_vec(vec![0.1, 0.2, -0.3]));
        enc.matrix(&sample_matrix());
        enc.scalar(std::f64::consts::PI);
        enc.token("</T>");
        enc.finish()
    }

    fn decode_all(data: &[u8], binary: bool) {
        let mut dec = Decoder::new(data, binary).unwrap();
        dec.expect_token("<T>").unwrap();
        assert_eq!(dec.vector().unwrap().as_slice(), &[0.1, 0.2, -0.3]);
        assert_eq!(dec.matrix().unwrap(), sample_matrix());
        assert_eq!(dec.scalar().unwrap(), std::f64::consts::PI);
        dec.expect_token("</T>").unwrap();
    }

    #[test]
    fn binary_values_are_exact() {
        decode_all(&encode_all(true), true);
    }

    #[test]
    fn text_values_are_exact() {
        let data = encode_all(false);
        let text = std::str::from_utf8(&data).unwrap();
        assert!(text.starts_with("<T>  [ 0.1 0.2 -0.3 ]"), "got {text}");
        decode_all(&data, false);
    }

    #[test]
    fn text_tolerates_extra_whitespace() {
        let text = "<T>\n[ 0.1   0.2 -0.3\n]\n\n [\n 1 -2.5 0.1 \n 3e-7 4 1.7976931348623157e308 ]\n\t3.141592653589793 </T>";
        decode_all(text.as_bytes(), false);
    }

    #[test]
    fn text_rejects_ragged_matrix() {
        let mut dec = Decoder::new(b"[\n 1 2\n 3 ]", false).unwrap();
        assert!(matches!(dec.matrix(), Err(NoiseVecError::Format(_))));
    }

    #[test]
    fn text_rejects_non_number() {
        let mut dec = Decoder::new(b"[ 1 abc ]", false).unwrap();
        assert!(matches!(dec.vector(), Err(NoiseVecError::Format(_))));
    }

    #[test]
    fn empty_matrix_round_trips() {
        for binary in [true, false] {
            let mut enc = Encoder::new(binary);
            enc.matrix(&DMatrix::zeros(0, 0));
            let data = enc.finish();
            let mut dec = Decoder::new(&data, binary).unwrap();
            assert_eq!(dec.matrix().unwrap().shape(), (0, 0));
        }
    }

    #[test]
    fn binary_truncation_is_format_error() {
        let data = encode_all(true);
        let cut = &data[..data.len() - 12];
        let mut dec = Decoder::new(cut, true).unwrap();
        dec.expect_token("<T>").unwrap();
        dec.vector().unwrap();
        dec.matrix().unwrap();
        let err = dec.scalar().and_then(|_| dec.expect_token("</T>"));
        assert!(matches!(err, Err(NoiseVecError::Format(_))));
    }

    #[test]
    fn binary_wrong_tag() {
        let mut enc = Encoder::new(true);
        enc.matrix(&sample_matrix());
        let data = enc.finish();
        let mut dec = Decoder::new(&data, true).unwrap();
        let err = dec.vector().unwrap_err();
        assert!(err.to_string().contains("vector tag"), "got {err}");
    }
}
