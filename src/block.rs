/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! IEEE 488.2 arbitrary block framing
//!
//! Binary query responses are sent as `#<n><len><payload>` where `<n>` is a
//! single ASCII digit giving the number of digits in `<len>`. The indefinite
//! form `#0<payload>\n` has no length and ends at the message terminator.

use thiserror::Error;

use crate::error::CaptureFailure;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("response does not start with `#`")]
    MissingMarker,
    #[error("invalid digit count `{0}` in block header")]
    BadDigitCount(u8),
    #[error("invalid length field `{0}` in block header")]
    BadLength(String),
    #[error("block header is incomplete")]
    IncompleteHeader,
    #[error("block declares {declared} bytes but only {received} were received")]
    Truncated { declared: usize, received: usize },
}

impl From<BlockError> for CaptureFailure {
    fn from(e: BlockError) -> Self {
        CaptureFailure::MalformedResponse(e.to_string())
    }
}

/// Decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// number of bytes taken by `#<n><len>`
    pub header_len: usize,
    /// declared payload length, `None` for the indefinite form
    pub payload_len: Option<usize>,
}

impl BlockHeader {
    /// Total frame length (header + payload) if known
    pub fn frame_len(&self) -> Option<usize> {
        self.payload_len.map(|len| self.header_len + len)
    }
}

/// Parse the block header at the start of `data`
///
/// Returns `Ok(None)` when more bytes are needed to decide.
pub fn parse_header(data: &[u8]) -> Result<Option<BlockHeader>, BlockError> {
    match data.first() {
        None => return Ok(None),
        Some(b'#') => {}
        Some(_) => return Err(BlockError::MissingMarker),
    }

    let digits = match data.get(1) {
        None => return Ok(None),
        Some(d) if d.is_ascii_digit() => usize::from(d - b'0'),
        Some(d) => return Err(BlockError::BadDigitCount(*d)),
    };

    if digits == 0 {
        return Ok(Some(BlockHeader {
            header_len: 2,
            payload_len: None,
        }));
    }

    let header_len = 2 + digits;
    if data.len() < header_len {
        return Ok(None);
    }

    let field = &data[2..header_len];
    let len = std::str::from_utf8(field)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| BlockError::BadLength(String::from_utf8_lossy(field).into_owned()))?;

    Ok(Some(BlockHeader {
        header_len,
        payload_len: Some(len),
    }))
}

/// Extract the payload of a complete block response
///
/// A trailing terminator after a definite block is ignored.
pub fn parse_block(data: &[u8]) -> Result<&[u8], BlockError> {
    let header = parse_header(data)?.ok_or(BlockError::IncompleteHeader)?;
    let body = &data[header.header_len..];

    match header.payload_len {
        Some(len) => {
            if body.len() < len {
                return Err(BlockError::Truncated {
                    declared: len,
                    received: body.len(),
                });
            }
            Ok(&body[..len])
        }
        None => Ok(body.strip_suffix(b"\n").unwrap_or(body)),
    }
}
