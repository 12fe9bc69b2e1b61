/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

use std::io;
use thiserror::Error;

use crate::discovery::Candidate;
use crate::transport::Address;

/// Errors raised by a transport backend or a single session
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("error on low level USB: {0}")]
    Usb(rusb::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("i/o error: {0}")]
    Io(io::Error),
    #[error("timed out waiting for the instrument")]
    Timeout,
    #[error("invalid resource address `{0}`")]
    InvalidAddress(String),
    #[error("resource `{0}` not found")]
    NotFound(String),
    #[error("no backend handles `{0}`")]
    Unsupported(String),
    #[error("not a usbtmc device")]
    NotUsbtmcDevice,
    #[error("not connected")]
    NotConnected,
    #[error("request failed")]
    Request,
    #[error("decoding error (utf-8)")]
    Decoding(#[from] std::string::FromUtf8Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<rusb::Error> for TransportError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Timeout => TransportError::Timeout,
            e => TransportError::Usb(e),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            _ => TransportError::Io(e),
        }
    }
}

/// Why a capture from a resolved instrument failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    #[error("could not open session: {0}")]
    SessionOpen(String),
    #[error("instrument did not answer in time")]
    Timeout,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("instrument sent an empty image")]
    EmptyPayload,
    #[error("response is not in the expected image format")]
    UnexpectedFormat,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<TransportError> for CaptureFailure {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => CaptureFailure::Timeout,
            TransportError::Protocol(msg) => CaptureFailure::MalformedResponse(msg),
            e => CaptureFailure::Transport(e.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("resource manager unavailable: {0}")]
    Transport(#[from] TransportError),
    #[error("{}", no_resources_message(.hint))]
    NoResources { hint: Option<String> },
    #[error("{}", no_match_message(.candidates))]
    NoMatch { candidates: Vec<Candidate> },
    #[error("{}", ambiguous_message(.candidates))]
    Ambiguous { candidates: Vec<Candidate> },
    #[error("found {address} but capture failed")]
    Capture {
        address: Address,
        #[source]
        reason: CaptureFailure,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("could not open a viewer: {0}")]
    View(#[from] opener::OpenError),
}

impl Error {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::NoResources { .. } | Error::NoMatch { .. } | Error::Ambiguous { .. } => 2,
            Error::Capture { .. } => 3,
            _ => 1,
        }
    }
}

fn no_resources_message(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("no instrument address contains `{}`", h),
        None => "no instruments found on any interface".to_string(),
    }
}

fn no_match_message(candidates: &[Candidate]) -> String {
    let mut msg = String::from("no supported instrument found");
    if candidates.is_empty() {
        msg.push_str(" (no instrument answered the identity query)");
    }
    for c in candidates {
        msg.push_str(&format!("\n  {}: {}", c.address, c.identity.raw()));
    }
    msg
}

fn ambiguous_message(candidates: &[Candidate]) -> String {
    let mut msg = format!(
        "{} supported instruments found, narrow the search with --name",
        candidates.len()
    );
    for c in candidates {
        msg.push_str(&format!("\n  {}: {}", c.address, c.identity.raw()));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn capture_error_keeps_its_reason() {
        let err = Error::Capture {
            address: Address::new("TCPIP0::127.0.0.1::5555::SOCKET"),
            reason: CaptureFailure::MalformedResponse("block declared 4107 bytes, got 119".into()),
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.to_string(),
            "found TCPIP0::127.0.0.1::5555::SOCKET but capture failed"
        );

        let source = err.source().and_then(|s| s.downcast_ref::<CaptureFailure>());
        assert!(matches!(source, Some(CaptureFailure::MalformedResponse(_))));
    }

    #[test]
    fn stream_errors_map_to_capture_reasons() {
        assert_eq!(
            CaptureFailure::from(TransportError::Timeout),
            CaptureFailure::Timeout
        );
        assert_eq!(
            CaptureFailure::from(TransportError::Protocol("short".into())),
            CaptureFailure::MalformedResponse("short".into())
        );
        assert!(matches!(
            CaptureFailure::from(TransportError::NotConnected),
            CaptureFailure::Transport(_)
        ));
    }

    #[test]
    fn viewer_failure_keeps_its_cause() {
        let cause = io::Error::new(io::ErrorKind::NotFound, "xdg-open not installed");
        let err = Error::from(opener::OpenError::Io(cause));
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("could not open a viewer"));
        assert!(err.source().is_some());
    }
}
