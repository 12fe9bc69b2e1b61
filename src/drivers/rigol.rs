/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Rigol DHO800/DHO900 and DS1000Z/MSO1000Z
//!
//! Both return the display as a PNG inside a definite length block.

use crate::block;
use crate::driver::{DriverDescriptor, ImageFormat, MatchRule};
use crate::error::CaptureFailure;
use crate::transport::Session;

pub const DHO: DriverDescriptor = DriverDescriptor::new(
    "rigol-dho",
    MatchRule::new(&["RIGOL"], &["DHO"]),
    ImageFormat::Png,
    capture_dho,
);

pub const DS1000Z: DriverDescriptor = DriverDescriptor::new(
    "rigol-ds1000z",
    MatchRule::new(&["RIGOL"], &["DS1", "MSO1"]),
    ImageFormat::Png,
    capture_ds1000z,
);

fn capture_dho(session: &mut dyn Session) -> Result<Vec<u8>, CaptureFailure> {
    read_display(session, ":DISPlay:DATA? PNG")
}

/// Arguments are color, invert, format
fn capture_ds1000z(session: &mut dyn Session) -> Result<Vec<u8>, CaptureFailure> {
    read_display(session, ":DISPlay:DATA? ON,OFF,PNG")
}

fn read_display(session: &mut dyn Session, command: &str) -> Result<Vec<u8>, CaptureFailure> {
    let data = session.query_binary(command)?;
    Ok(block::parse_block(&data)?.to_vec())
}
