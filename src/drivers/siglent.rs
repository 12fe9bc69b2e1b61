/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Siglent SDS series
//!
//! `SCDP` answers with a bare BMP file. Some firmwares wrap it in a block,
//! both are accepted.

use log::debug;

use crate::block;
use crate::driver::{DriverDescriptor, ImageFormat, MatchRule};
use crate::error::CaptureFailure;
use crate::transport::Session;

pub const SDS: DriverDescriptor = DriverDescriptor::new(
    "siglent-sds",
    MatchRule::new(&["SIGLENT"], &["SDS"]),
    ImageFormat::Bmp,
    capture,
);

fn capture(session: &mut dyn Session) -> Result<Vec<u8>, CaptureFailure> {
    let data = session.query_binary("SCDP")?;
    if data.first() == Some(&b'#') {
        debug!("SCDP response is block framed");
        return Ok(block::parse_block(&data)?.to_vec());
    }
    Ok(data)
}
