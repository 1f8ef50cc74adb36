//! Decoder for `Transfer-Encoding: chunked` request bodies.
//!
//! Driven by [`RequestParser`](crate::http::parser::RequestParser) once the
//! header block announced a chunked body. Chunk payloads are appended to the
//! parser's body buffer; extensions and trailers are validated and dropped.

use bytes::BytesMut;

use crate::http::parser::{ParseError, is_control, is_token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    ExtName,
    ExtValue,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    TrailerLineStart,
    TrailerName,
    TrailerValue,
    TrailerLf,
    EndLf,
    Done,
}

/// Outcome of feeding bytes to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// Every byte was consumed and the body is not finished yet.
    NeedMoreData,
    /// The terminating chunk and trailer section ended after `consumed` bytes.
    Complete { consumed: usize },
}

#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    state: State,
    size: u64,
    size_digits: usize,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self {
            state: State::Size,
            size: 0,
            size_digits: 0,
        }
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consumes `data`, appending chunk payloads to `body`.
    ///
    /// `max_body` bounds the total length of `body`.
    pub fn feed(
        &mut self,
        data: &[u8],
        body: &mut BytesMut,
        max_body: usize,
    ) -> Result<Decode, ParseError> {
        let mut i = 0;

        while i < data.len() {
            if self.state == State::Data {
                let available = (data.len() - i) as u64;
                let take = self.size.min(available) as usize;
                body.extend_from_slice(&data[i..i + take]);
                self.size -= take as u64;
                i += take;

                if self.size == 0 {
                    self.state = State::DataCr;
                }
                continue;
            }

            let byte = data[i];
            i += 1;

            match self.state {
                State::Size => match byte {
                    b'\r' if self.size_digits > 0 => self.state = State::SizeLf,
                    b';' if self.size_digits > 0 => self.state = State::ExtName,
                    _ => {
                        let digit = (byte as char).to_digit(16).ok_or(ParseError::InvalidChunk)?;
                        self.size = self
                            .size
                            .checked_mul(16)
                            .and_then(|size| size.checked_add(u64::from(digit)))
                            .ok_or(ParseError::InvalidChunk)?;
                        self.size_digits += 1;
                    }
                },
                State::ExtName => match byte {
                    b'=' => self.state = State::ExtValue,
                    b';' => {}
                    b'\r' => self.state = State::SizeLf,
                    b if is_token(b) => {}
                    _ => return Err(ParseError::InvalidChunk),
                },
                State::ExtValue => match byte {
                    b';' => self.state = State::ExtName,
                    b'\r' => self.state = State::SizeLf,
                    b if is_control(b) => return Err(ParseError::InvalidChunk),
                    _ => {}
                },
                State::SizeLf => {
                    if byte != b'\n' {
                        return Err(ParseError::InvalidChunk);
                    }

                    if self.size == 0 {
                        self.state = State::TrailerLineStart;
                    } else {
                        let total = (body.len() as u64).saturating_add(self.size);
                        if total > max_body as u64 {
                            return Err(ParseError::BodyTooLarge);
                        }
                        body.reserve(self.size as usize);
                        self.state = State::Data;
                    }
                }
                State::DataCr => match byte {
                    b'\r' => self.state = State::DataLf,
                    _ => return Err(ParseError::InvalidChunk),
                },
                State::DataLf => match byte {
                    b'\n' => {
                        self.size = 0;
                        self.size_digits = 0;
                        self.state = State::Size;
                    }
                    _ => return Err(ParseError::InvalidChunk),
                },
                State::TrailerLineStart => match byte {
                    b'\r' => self.state = State::EndLf,
                    b if is_token(b) => self.state = State::TrailerName,
                    _ => return Err(ParseError::InvalidChunk),
                },
                State::TrailerName => match byte {
                    b':' => self.state = State::TrailerValue,
                    b if is_token(b) => {}
                    _ => return Err(ParseError::InvalidChunk),
                },
                State::TrailerValue => match byte {
                    b'\r' => self.state = State::TrailerLf,
                    b'\t' => {}
                    b if is_control(b) => return Err(ParseError::InvalidChunk),
                    _ => {}
                },
                State::TrailerLf => match byte {
                    b'\n' => self.state = State::TrailerLineStart,
                    _ => return Err(ParseError::InvalidChunk),
                },
                State::EndLf => match byte {
                    b'\n' => {
                        self.state = State::Done;
                        return Ok(Decode::Complete { consumed: i });
                    }
                    _ => return Err(ParseError::InvalidChunk),
                },
                // Data is drained above; nothing may follow the final CRLF.
                State::Data | State::Done => return Err(ParseError::InvalidChunk),
            }
        }

        Ok(Decode::NeedMoreData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1 << 20;

    fn decode(input: &[u8]) -> Result<(Vec<u8>, Decode), ParseError> {
        let mut decoder = ChunkedDecoder::new();
        let mut body = BytesMut::new();
        let result = decoder.feed(input, &mut body, MAX)?;
        Ok((body.to_vec(), result))
    }

    #[test]
    fn decodes_multiple_chunks() {
        let input = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let (body, result) = decode(input).unwrap();

        assert_eq!(body, b"hello world");
        assert_eq!(result, Decode::Complete { consumed: input.len() });
    }

    #[test]
    fn hex_sizes_any_case() {
        let payload = vec![b'x'; 0x1a];
        let mut input = b"1A\r\n".to_vec();
        input.extend_from_slice(&payload);
        input.extend_from_slice(b"\r\n0\r\n\r\n");

        let (body, _) = decode(&input).unwrap();
        assert_eq!(body, payload);
    }

    #[test]
    fn extensions_and_trailers_are_dropped() {
        let input = b"3;name=value;flag\r\nabc\r\n0;last\r\nExpires: never\r\nX-Sum: 1\r\n\r\n";
        let (body, result) = decode(input).unwrap();

        assert_eq!(body, b"abc");
        assert_eq!(result, Decode::Complete { consumed: input.len() });
    }

    #[test]
    fn stops_at_end_of_message() {
        let input = b"1\r\na\r\n0\r\n\r\nGET / HTTP/1.1\r\n";
        let (_, result) = decode(input).unwrap();

        assert_eq!(result, Decode::Complete { consumed: 11 });
    }

    #[test]
    fn partial_input_needs_more() {
        let (body, result) = decode(b"5\r\nhel").unwrap();
        assert_eq!(body, b"hel");
        assert_eq!(result, Decode::NeedMoreData);
    }

    #[test]
    fn rejects_missing_size() {
        assert_eq!(decode(b"\r\n").unwrap_err(), ParseError::InvalidChunk);
        assert_eq!(decode(b"zz\r\n").unwrap_err(), ParseError::InvalidChunk);
    }

    #[test]
    fn rejects_missing_crlf_after_data() {
        assert_eq!(decode(b"2\r\nabX").unwrap_err(), ParseError::InvalidChunk);
    }

    #[test]
    fn rejects_overflowing_size() {
        let input = b"1ffffffffffffffff\r\n";
        assert_eq!(decode(input).unwrap_err(), ParseError::InvalidChunk);
    }

    #[test]
    fn enforces_body_limit() {
        let mut decoder = ChunkedDecoder::new();
        let mut body = BytesMut::new();
        let result = decoder.feed(b"10\r\n", &mut body, 8);

        assert_eq!(result.unwrap_err(), ParseError::BodyTooLarge);
    }
}
