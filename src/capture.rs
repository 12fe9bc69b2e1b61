/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Pull the display image off a resolved instrument

use log::{info, warn};
use std::time::Duration;

use crate::driver::{DriverDescriptor, ImageFormat};
use crate::error::{CaptureFailure, Error};
use crate::transport::{Address, ResourceManager, ScopedSession};

/// Last chunk of every PNG stream
const PNG_IEND: &[u8] = b"IEND";

/// A validated image exactly as the instrument sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub image: Vec<u8>,
    pub format: ImageFormat,
}

/// Check that `image` is a complete container of the given format
///
/// Guards against partial reads: the signature must be present, a BMP must
/// be at least as long as its header declares and a PNG must end with its
/// IEND chunk.
pub fn validate(image: &[u8], format: ImageFormat) -> Result<(), CaptureFailure> {
    if image.is_empty() {
        return Err(CaptureFailure::EmptyPayload);
    }

    let signature = format.signature();
    if !image.starts_with(signature) {
        if image.len() < signature.len() && signature.starts_with(image) {
            return Err(CaptureFailure::MalformedResponse(format!(
                "{} signature cut short after {} bytes",
                format,
                image.len()
            )));
        }
        return Err(CaptureFailure::UnexpectedFormat);
    }

    match format {
        ImageFormat::Bmp => {
            if image.len() < 6 {
                return Err(CaptureFailure::MalformedResponse(
                    "bmp header cut short".into(),
                ));
            }
            let declared = u32::from_le_bytes([image[2], image[3], image[4], image[5]]) as usize;
            if declared > image.len() {
                return Err(CaptureFailure::MalformedResponse(format!(
                    "bmp declares {} bytes but only {} were received",
                    declared,
                    image.len()
                )));
            }
        }
        ImageFormat::Png => {
            // IEND type field followed by its 4 byte CRC
            let tail = &image[image.len().saturating_sub(12)..];
            if !tail.windows(PNG_IEND.len()).any(|w| w == PNG_IEND) {
                return Err(CaptureFailure::MalformedResponse(
                    "png has no IEND chunk".into(),
                ));
            }
        }
    }

    Ok(())
}

fn run(
    manager: &dyn ResourceManager,
    address: &Address,
    driver: &DriverDescriptor,
    timeout: Duration,
) -> Result<CaptureResult, CaptureFailure> {
    let mut session = ScopedSession::open(manager, address, timeout)
        .map_err(|e| CaptureFailure::SessionOpen(e.to_string()))?;

    info!("capturing {} with {}", address, driver.id());
    let image = driver.capture_screen(&mut *session)?;

    if let Err(e) = session.close() {
        warn!("failed to close {}: {}", address, e);
    }

    validate(&image, driver.format())?;
    info!("received {} bytes of {}", image.len(), driver.format());

    Ok(CaptureResult {
        image,
        format: driver.format(),
    })
}

/// Open a fresh session on `address` and run the driver's capture protocol
pub fn capture(
    manager: &dyn ResourceManager,
    address: &Address,
    driver: &DriverDescriptor,
    timeout: Duration,
) -> Result<CaptureResult, Error> {
    run(manager, address, driver, timeout).map_err(|reason| Error::Capture {
        address: address.clone(),
        reason,
    })
}
