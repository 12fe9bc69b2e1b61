//! Find a connected oscilloscope and pull a screenshot off its display

/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

pub mod block;
pub mod capture;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod identity;
pub mod mock;
pub mod output;
pub mod serial;
pub mod tcp;
pub mod transport;
pub mod usbtmc;

use std::time::Duration;

pub use crate::capture::{capture, CaptureResult};
pub use crate::config::Config;
pub use crate::discovery::{discover, Candidate, Resolution};
pub use crate::driver::{DriverDescriptor, ImageFormat, MatchRule, Registry};
pub use crate::error::{CaptureFailure, Error, TransportError};
pub use crate::identity::Identity;
pub use crate::transport::{Address, Bus, ResourceManager, ScopedSession, Session};

/// Outcome of a complete discover and capture run
#[derive(Debug, Clone)]
pub struct Grab {
    pub address: Address,
    pub driver: DriverDescriptor,
    pub result: CaptureResult,
}

/// Discover exactly one supported instrument and capture its display
///
/// Nothing is retried, the first failure ends the run.
pub fn grab(
    manager: &dyn ResourceManager,
    registry: &Registry,
    hint: Option<&str>,
    timeout: Duration,
) -> Result<Grab, Error> {
    let (address, driver) = discover(manager, registry, hint, timeout)?.into_found()?;
    let result = capture(manager, &address, &driver, timeout)?;

    Ok(Grab {
        address,
        driver,
        result,
    })
}
