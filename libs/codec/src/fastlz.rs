//! FastLZ block decompression, levels 1 and 2.
//!
//! The level is stored in the top three bits of the first byte. Every
//! instruction is either a literal run (`ctrl < 32`, copy `ctrl + 1` bytes)
//! or a back reference whose length and distance are packed into `ctrl` and
//! the bytes that follow it.

use crate::error::CodecError;

/// Level 2 back references past this distance use a 16-bit extension.
const MAX_L2_DISTANCE: usize = 8191;

/// Upper bound on the up-front allocation per input byte. `expected_len`
/// comes from file headers, so the output grows past this only as bytes
/// are actually produced.
const PREALLOC_PER_INPUT_BYTE: usize = 64;

pub fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
    let Some(&first) = input.first() else {
        return if expected_len == 0 {
            Ok(Vec::new())
        } else {
            Err(CodecError::Truncated(0))
        };
    };

    let level = (first >> 5) + 1;
    if level > 2 {
        return Err(CodecError::UnsupportedLevel(level));
    }

    let mut reader = Reader { input, pos: 1 };
    let mut out =
        Vec::with_capacity(expected_len.min(input.len().saturating_mul(PREALLOC_PER_INPUT_BYTE)));
    let mut ctrl = usize::from(first & 31);

    loop {
        if ctrl >= 32 {
            let mut len = (ctrl >> 5) - 1;
            let ofs = (ctrl & 31) << 8;
            let mut distance = ofs + 1;

            if level == 1 {
                if len == 7 - 1 {
                    len += reader.next()?;
                }
                distance += reader.next()?;
            } else {
                if len == 7 - 1 {
                    loop {
                        let code = reader.next()?;
                        len += code;
                        if code != 255 {
                            break;
                        }
                    }
                }
                let code = reader.next()?;
                distance += code;
                if code == 255 && ofs == 31 << 8 {
                    let far = (reader.next()? << 8) + reader.next()?;
                    distance = far + MAX_L2_DISTANCE + 1;
                }
            }
            len += 3;

            if distance > out.len() {
                return Err(CodecError::BadOffset {
                    distance,
                    available: out.len(),
                });
            }
            if out.len() + len > expected_len {
                return Err(CodecError::OutputOverrun {
                    expected: expected_len,
                });
            }
            // Byte by byte: the source may overlap what is being written.
            let start = out.len() - distance;
            for i in 0..len {
                let byte = out[start + i];
                out.push(byte);
            }
        } else {
            let run = ctrl + 1;
            let literal = reader.take(run)?;
            if out.len() + run > expected_len {
                return Err(CodecError::OutputOverrun {
                    expected: expected_len,
                });
            }
            out.extend_from_slice(literal);
        }

        if reader.is_empty() {
            break;
        }
        ctrl = reader.next()?;
    }

    if out.len() != expected_len {
        return Err(CodecError::LengthMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn next(&mut self) -> Result<usize, CodecError> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or(CodecError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(usize::from(byte))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + len;
        let slice = self
            .input
            .get(self.pos..end)
            .ok_or(CodecError::Truncated(self.input.len()))?;
        self.pos = end;
        Ok(slice)
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }
}
