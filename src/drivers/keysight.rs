/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Keysight (formerly Agilent) InfiniiVision 1000X to 6000X

use crate::block;
use crate::driver::{DriverDescriptor, ImageFormat, MatchRule};
use crate::error::CaptureFailure;
use crate::transport::Session;

pub const INFINIIVISION: DriverDescriptor = DriverDescriptor::new(
    "keysight-infiniivision",
    MatchRule::new(
        &["KEYSIGHT", "AGILENT"],
        &["DSO-X", "MSO-X", "DSOX", "MSOX"],
    ),
    ImageFormat::Png,
    capture,
);

fn capture(session: &mut dyn Session) -> Result<Vec<u8>, CaptureFailure> {
    // ink saver inverts the graticule background
    session.write(":HARDcopy:INKSaver OFF")?;
    let data = session.query_binary(":DISPlay:DATA? PNG,COLor")?;
    Ok(block::parse_block(&data)?.to_vec())
}
